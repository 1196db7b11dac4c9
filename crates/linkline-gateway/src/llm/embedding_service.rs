//! Embedding provider.
//!
//! `HttpEmbedder` talks to an OpenAI-compatible `/v1/embeddings` endpoint.
//! `EmbeddingService` owns the single embedder for the process, builds it on
//! first use and runs every embedding call on the embedding lane.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::Embedder;
use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::thread_pool::{ThreadPool, WorkerLane};

const EMBED_BATCH_SIZE: usize = 64;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

pub struct HttpEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    http_client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimensions,
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.openai_api_keys.first().ok_or_else(|| {
            GatewayError::Configuration("No OpenAI API key available for embeddings".to_string())
        })?;
        Ok(Self::new(
            &config.openai_base_url,
            api_key,
            &config.embedding_model,
            config.embedding_dimension,
            Duration::from_secs(config.request_timeout_seconds.max(1)),
        ))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| GatewayError::Backend("Embedding response contained no vectors".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .http_client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest { model: &self.model, input: texts })
            .send()
            .await
            .map_err(|e| GatewayError::Backend(format!("Embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status("Embedding backend", status, &body));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Backend(format!("Failed to parse embedding response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(GatewayError::Backend(format!(
                "Embedding backend returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Builds the embedder the first time it is needed.
pub type EmbedderFactory = Arc<dyn Fn() -> Result<Arc<dyn Embedder>> + Send + Sync>;

pub struct EmbeddingService {
    factory: EmbedderFactory,
    embedder: OnceCell<Arc<dyn Embedder>>,
    thread_pool: Arc<ThreadPool>,
}

impl EmbeddingService {
    pub fn new(factory: EmbedderFactory, thread_pool: Arc<ThreadPool>) -> Self {
        Self {
            factory,
            embedder: OnceCell::new(),
            thread_pool,
        }
    }

    pub fn from_config(config: &Config, thread_pool: Arc<ThreadPool>) -> Self {
        let config = config.clone();
        let factory: EmbedderFactory = Arc::new(move || {
            let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::from_config(&config)?);
            Ok(embedder)
        });
        Self::new(factory, thread_pool)
    }

    /// The shared embedder, constructed at most once.
    pub async fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        let embedder = self
            .embedder
            .get_or_try_init(|| async {
                let embedder = (self.factory)()?;
                info!(
                    "Embedding service initialized with model {} ({} dims)",
                    embedder.model_name(),
                    embedder.dimensions()
                );
                Ok::<_, GatewayError>(embedder)
            })
            .await?;
        Ok(embedder.clone())
    }

    pub fn is_initialized(&self) -> bool {
        self.embedder.initialized()
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = self.embedder().await?;
        let text = text.to_string();
        self.thread_pool
            .spawn(WorkerLane::Embedding, async move { embedder.embed(&text).await })
            .await
    }

    pub async fn embed_documents(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let embedder = self.embedder().await?;
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let embedder = embedder.clone();
            let batch = batch.to_vec();
            debug!("Embedding batch of {} chunk(s)", batch.len());
            let embedded = self
                .thread_pool
                .spawn(WorkerLane::Embedding, async move { embedder.embed_batch(&batch).await })
                .await?;
            vectors.extend(embedded);
        }

        Ok(vectors)
    }
}
