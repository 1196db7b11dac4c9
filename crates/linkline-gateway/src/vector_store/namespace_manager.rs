//! Per-group index lifecycle and namespaced document operations.
//!
//! Every group gets its own index, named `{base}-{normalized group}`, and
//! its vectors live in the namespace keyed by the raw group id. Indexes are
//! created lazily on the first write and polled until ready.

use dashmap::DashMap;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    DistanceMetric, KnowledgeBaseInfo, Retriever, SearchHit, SearchResponse, VectorBackend,
    VectorRecord, TEXT_KEY,
};
use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::ingestion::{prepare_document, FileType, IngestionResult, RecursiveTextSplitter};
use crate::llm::EmbeddingService;
use crate::thread_pool::{ThreadPool, WorkerLane};
use crate::utils::TextUtils;

/// Index name for a group: lower-cased, `_` and spaces turned into `-`.
pub fn index_name_for_group(base: &str, group_id: &str) -> String {
    let safe_group = group_id.to_lowercase().replace(['_', ' '], "-");
    format!("{}-{}", base, safe_group)
}

#[derive(Debug, Clone)]
pub struct NamespaceSettings {
    pub base_index_name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub poll_interval: Duration,
    pub ready_timeout: Duration,
    pub retrieval_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl NamespaceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_index_name: config.pinecone_index_name.clone(),
            dimension: config.embedding_dimension,
            metric: DistanceMetric::Cosine,
            poll_interval: Duration::from_secs(config.index_ready_poll_seconds),
            ready_timeout: Duration::from_secs(config.index_ready_timeout_seconds),
            retrieval_k: config.retrieval_k,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }
}

pub struct VectorNamespaceManager {
    backend: Arc<dyn VectorBackend>,
    embeddings: Arc<EmbeddingService>,
    thread_pool: Arc<ThreadPool>,
    settings: NamespaceSettings,
    splitter: RecursiveTextSplitter,
    creation_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl VectorNamespaceManager {
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        embeddings: Arc<EmbeddingService>,
        thread_pool: Arc<ThreadPool>,
        settings: NamespaceSettings,
    ) -> Result<Self> {
        let splitter = RecursiveTextSplitter::new(settings.chunk_size, settings.chunk_overlap)?;
        info!(
            "Vector namespace manager ready ({} backend, base index '{}')",
            backend.backend_name(),
            settings.base_index_name
        );
        Ok(Self {
            backend,
            embeddings,
            thread_pool,
            settings,
            splitter,
            creation_locks: DashMap::new(),
        })
    }

    pub fn index_name(&self, group_id: &str) -> String {
        index_name_for_group(&self.settings.base_index_name, group_id)
    }

    async fn list_indexes(&self) -> Result<Vec<String>> {
        let backend = self.backend.clone();
        self.thread_pool
            .spawn(WorkerLane::VectorIo, async move { backend.list_indexes().await })
            .await
    }

    async fn index_exists(&self, index_name: &str) -> Result<bool> {
        Ok(self.list_indexes().await?.iter().any(|name| name == index_name))
    }

    /// Make sure the group's index exists and is ready. Returns its name.
    pub async fn ensure_namespace(&self, group_id: &str) -> Result<String> {
        let index_name = self.index_name(group_id);

        let lock = self
            .creation_locks
            .entry(index_name.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock().await;
        self.create_if_missing(&index_name).await?;
        drop(guard);

        // Once the index exists the lock has nothing left to guard.
        self.creation_locks
            .remove_if(&index_name, |_, current| Arc::ptr_eq(current, &lock));
        Ok(index_name)
    }

    async fn create_if_missing(&self, index_name: &str) -> Result<()> {
        if self.index_exists(index_name).await? {
            return Ok(());
        }

        info!("Creating new index: {}", index_name);
        let backend = self.backend.clone();
        let name = index_name.to_string();
        let dimension = self.settings.dimension;
        let metric = self.settings.metric;
        self.thread_pool
            .spawn(WorkerLane::VectorIo, async move {
                backend.create_index(&name, dimension, metric).await
            })
            .await
            .map_err(|e| {
                error!("Error creating index {}: {}", index_name, e);
                e
            })?;

        self.wait_until_ready(index_name).await
    }

    async fn wait_until_ready(&self, index_name: &str) -> Result<()> {
        let started = Instant::now();
        loop {
            let backend = self.backend.clone();
            let name = index_name.to_string();
            let ready = self
                .thread_pool
                .spawn(WorkerLane::VectorIo, async move { backend.index_ready(&name).await })
                .await?;
            if ready {
                info!("Index {} is ready.", index_name);
                return Ok(());
            }
            if started.elapsed() >= self.settings.ready_timeout {
                return Err(GatewayError::Backend(format!(
                    "Index {} was not ready after {}s",
                    index_name,
                    self.settings.ready_timeout.as_secs()
                )));
            }
            info!("Waiting for index {} to be ready...", index_name);
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// Load, split, embed and store one file in the group's namespace.
    pub async fn add_document(
        &self,
        file_path: PathBuf,
        filename: &str,
        file_type: FileType,
        group_id: &str,
    ) -> Result<IngestionResult> {
        info!("Starting document addition for group '{}', file '{}'", group_id, filename);

        let splitter = self.splitter.clone();
        let source = filename.to_string();
        let group = group_id.to_string();
        let chunks = self
            .thread_pool
            .spawn_blocking(WorkerLane::Documents, move || {
                prepare_document(&file_path, file_type, &splitter, &source, &group)
            })
            .await?;

        let index_name = self.ensure_namespace(group_id).await?;

        if chunks.is_empty() {
            warn!("No text extracted from {}; nothing to index", filename);
        } else {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embeddings.embed_documents(texts).await?;

            let records: Vec<VectorRecord> = chunks
                .iter()
                .zip(vectors)
                .map(|(chunk, values)| {
                    let mut metadata = chunk.metadata.clone();
                    metadata.insert(TEXT_KEY.to_string(), json!(chunk.text));
                    VectorRecord {
                        id: Uuid::new_v4().to_string(),
                        values,
                        metadata,
                    }
                })
                .collect();

            info!(
                "Adding {} chunks to index {} in namespace '{}'",
                records.len(),
                index_name,
                group_id
            );
            let backend = self.backend.clone();
            let namespace = group_id.to_string();
            self.thread_pool
                .spawn(WorkerLane::VectorIo, async move {
                    backend.upsert(&index_name, &namespace, records).await
                })
                .await?;
        }

        info!("Successfully added {} chunks from {} to group {}", chunks.len(), filename, group_id);
        Ok(IngestionResult {
            filename: filename.to_string(),
            chunk_count: chunks.len(),
            status: "success".to_string(),
            group_id: group_id.to_string(),
        })
    }

    /// Ranked hits from the group's namespace only. Hits scoring below
    /// `score_threshold` are dropped; scores are passed through unchanged.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        score_threshold: Option<f32>,
        group_id: &str,
    ) -> Result<SearchResponse> {
        info!(
            "KB search for group '{}' with query '{}'",
            group_id,
            TextUtils::truncate_with_ellipsis(query, 80)
        );
        let index_name = self.index_name(group_id);

        let passages = if self.index_exists(&index_name).await? {
            self.retriever_for(index_name, group_id, top_k)
                .retrieve_top(query, top_k)
                .await?
        } else {
            Vec::new()
        };

        let results: Vec<SearchHit> = passages
            .into_iter()
            .filter(|p| score_threshold.map_or(true, |min| p.score >= min))
            .map(|p| SearchHit { content: p.content, metadata: p.metadata, score: p.score })
            .collect();

        Ok(SearchResponse {
            query: query.to_string(),
            total_results: results.len(),
            results,
        })
    }

    /// Text of the best `k` passages for a query, or nothing on any failure.
    pub async fn relevant_context(&self, query: &str, group_id: &str, k: usize) -> Vec<String> {
        match self.search(query, k, None, group_id).await {
            Ok(response) => response.results.into_iter().map(|hit| hit.content).collect(),
            Err(e) => {
                error!("Error getting relevant context: {}", e);
                Vec::new()
            }
        }
    }

    fn retriever_for(&self, index_name: String, group_id: &str, k: usize) -> Retriever {
        Retriever::new(
            self.backend.clone(),
            self.embeddings.clone(),
            self.thread_pool.clone(),
            index_name,
            group_id.to_string(),
            k,
        )
    }

    /// A retriever for the group's namespace, or `None` when the group is
    /// empty, its index does not exist, or the lookup fails.
    pub async fn get_retriever(&self, group_id: &str) -> Option<Retriever> {
        if group_id.trim().is_empty() {
            warn!("get_retriever called with no group_id.");
            return None;
        }

        let index_name = self.index_name(group_id);
        match self.index_exists(&index_name).await {
            Ok(true) => Some(self.retriever_for(index_name, group_id, self.settings.retrieval_k)),
            Ok(false) => {
                info!("No index {} for group '{}'; retrieval unavailable", index_name, group_id);
                None
            }
            Err(e) => {
                error!("Failed to get retriever for group '{}': {}", group_id, e);
                None
            }
        }
    }

    /// Delete every vector in the group's namespace. A missing index is not an error.
    pub async fn clear(&self, group_id: &str) -> Result<()> {
        let index_name = self.index_name(group_id);
        if !self.index_exists(&index_name).await? {
            return Ok(());
        }

        let backend = self.backend.clone();
        let namespace = group_id.to_string();
        let index = index_name.clone();
        self.thread_pool
            .spawn(WorkerLane::VectorIo, async move {
                backend.delete_namespace(&index, &namespace).await
            })
            .await?;
        info!("Cleared knowledge base for group {} in index {}", group_id, index_name);
        Ok(())
    }

    pub async fn info(&self, group_id: &str) -> Result<KnowledgeBaseInfo> {
        let index_name = self.index_name(group_id);
        if !self.index_exists(&index_name).await? {
            return Ok(KnowledgeBaseInfo::index_not_found());
        }

        let backend = self.backend.clone();
        let namespace = group_id.to_string();
        let count = self
            .thread_pool
            .spawn(WorkerLane::VectorIo, async move {
                backend.namespace_vector_count(&index_name, &namespace).await
            })
            .await?;
        Ok(KnowledgeBaseInfo::from_vector_count(count))
    }
}
