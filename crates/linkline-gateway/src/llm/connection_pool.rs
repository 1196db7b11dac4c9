//! Pool of interchangeable chat-model handles.

use rand::Rng;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use super::{ChatModel, LLMWorker, LlmSettings};
use crate::config::Config;
use crate::error::{GatewayError, Result};

/// Builds one handle bound to the given credential.
pub type ChatModelFactory = Arc<dyn Fn(&str) -> Arc<dyn ChatModel> + Send + Sync>;

pub struct LlmConnectionPool {
    credentials: Vec<String>,
    requested_size: usize,
    factory: ChatModelFactory,
    handles: OnceCell<Vec<Arc<dyn ChatModel>>>,
    cursor: Mutex<usize>,
}

impl LlmConnectionPool {
    pub fn new(credentials: Vec<String>, requested_size: usize, factory: ChatModelFactory) -> Self {
        Self {
            credentials,
            requested_size,
            factory,
            handles: OnceCell::new(),
            cursor: Mutex::new(0),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let settings = LlmSettings::from_config(config);
        let factory: ChatModelFactory = Arc::new(move |api_key: &str| {
            let worker: Arc<dyn ChatModel> = Arc::new(LLMWorker::new(settings.clone(), api_key));
            worker
        });
        Self::new(config.openai_api_keys.clone(), config.max_workers, factory)
    }

    /// Number of handles the pool builds: at least one, at most two per credential.
    pub fn target_size(requested: usize, credentials: usize) -> usize {
        requested.max(1).min(credentials * 2)
    }

    /// Build the handles. Concurrent first callers share one initialization.
    pub async fn initialize(&self) -> Result<()> {
        self.handles().await.map(|_| ())
    }

    async fn handles(&self) -> Result<&Vec<Arc<dyn ChatModel>>> {
        self.handles
            .get_or_try_init(|| async {
                if self.credentials.is_empty() {
                    warn!("LLM pool initialization failed: no API keys configured");
                    return Err(GatewayError::Configuration(
                        "No OpenAI API keys found in environment variables".to_string(),
                    ));
                }

                let size = Self::target_size(self.requested_size, self.credentials.len());
                let handles: Vec<Arc<dyn ChatModel>> = self
                    .credentials
                    .iter()
                    .cycle()
                    .take(size)
                    .map(|key| (self.factory)(key))
                    .collect();

                info!("LLM pool initialized with {} instance(s)", handles.len());
                Ok::<_, GatewayError>(handles)
            })
            .await
    }

    /// Next handle in cyclic order.
    pub async fn acquire_round_robin(&self) -> Result<Arc<dyn ChatModel>> {
        let handles = self.handles().await?;
        let mut cursor = self.cursor.lock().await;
        let handle = handles[*cursor % handles.len()].clone();
        *cursor = (*cursor + 1) % handles.len();
        Ok(handle)
    }

    /// Uniformly chosen handle.
    pub async fn acquire_random(&self) -> Result<Arc<dyn ChatModel>> {
        let handles = self.handles().await?;
        let index = rand::thread_rng().gen_range(0..handles.len());
        Ok(handles[index].clone())
    }

    pub fn is_initialized(&self) -> bool {
        self.handles.initialized()
    }

    /// Handles built so far; zero before initialization.
    pub fn size(&self) -> usize {
        self.handles.get().map(Vec::len).unwrap_or(0)
    }
}
