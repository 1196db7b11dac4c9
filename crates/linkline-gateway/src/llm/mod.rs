//! Chat-model and embedding providers, the client pool and retry policy.

pub mod connection_pool;
pub mod embedding_service;
pub mod llm_worker;
pub mod retry;

use async_trait::async_trait;

use crate::error::Result;
use crate::memory::Message;

pub use connection_pool::{ChatModelFactory, LlmConnectionPool};
pub use embedding_service::{EmbedderFactory, EmbeddingService, HttpEmbedder};
pub use llm_worker::{LLMWorker, LlmSettings};
pub use retry::{Chain, RetryExecutor, RetryPolicy};

/// A chat-completion capable client bound to one credential.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}
