//! Fakes shared by the unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::llm::{
    ChatModel, ChatModelFactory, Embedder, EmbedderFactory, EmbeddingService, LlmConnectionPool,
    RetryPolicy,
};
use crate::memory::Message;
use crate::thread_pool::{ThreadPool, ThreadPoolConfig};
use crate::vector_store::{
    DistanceMetric, InMemoryVectorBackend, NamespaceSettings, VectorNamespaceManager,
};

pub const TEST_DIMS: usize = 32;

pub fn test_thread_pool() -> Arc<ThreadPool> {
    Arc::new(ThreadPool::new(ThreadPoolConfig {
        llm_workers: 2,
        embedding_workers: 2,
        vector_io_workers: 4,
        document_workers: 1,
    }))
}

/// A pool whose every handle is `model`.
pub fn shared_model_pool(model: Arc<ScriptedChatModel>) -> Arc<LlmConnectionPool> {
    let factory: ChatModelFactory = Arc::new(move |_key: &str| {
        let handle: Arc<dyn ChatModel> = model.clone();
        handle
    });
    Arc::new(LlmConnectionPool::new(vec!["sk-test".to_string()], 1, factory))
}

pub fn fast_retry_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        backoff_base: Duration::from_millis(1),
        max_jitter: Duration::from_millis(1),
        transient_delay: Duration::from_millis(1),
    }
}

pub fn test_namespace_settings() -> NamespaceSettings {
    NamespaceSettings {
        base_index_name: "chatbot-rag".to_string(),
        dimension: TEST_DIMS,
        metric: DistanceMetric::Cosine,
        poll_interval: Duration::from_millis(5),
        ready_timeout: Duration::from_secs(5),
        retrieval_k: 3,
        chunk_size: 200,
        chunk_overlap: 40,
    }
}

pub fn test_namespace_manager(
    backend: InMemoryVectorBackend,
    thread_pool: Arc<ThreadPool>,
) -> Arc<VectorNamespaceManager> {
    let factory: EmbedderFactory = Arc::new(|| {
        let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::new(TEST_DIMS));
        Ok(embedder)
    });
    let embeddings = Arc::new(EmbeddingService::new(factory, thread_pool.clone()));
    Arc::new(
        VectorNamespaceManager::new(Arc::new(backend), embeddings, thread_pool, test_namespace_settings())
            .unwrap(),
    )
}

/// Chat model that answers from a script and records every prompt it sees.
pub struct ScriptedChatModel {
    name: String,
    script: Mutex<VecDeque<Result<String>>>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedChatModel {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies(name: &str, replies: &[&str]) -> Self {
        let model = Self::named(name);
        for reply in replies {
            model.push_reply(reply);
        }
        model
    }

    pub fn push_reply(&self, reply: &str) {
        self.script.lock().unwrap().push_back(Ok(reply.to_string()));
    }

    pub fn push_error(&self, error: GatewayError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(result) => result,
            None => {
                let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
                Ok(format!("{} says: {}", self.name, last))
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Bag-of-words embedder: every lower-cased word is hashed into one of
/// `dims` buckets and the vector is L2-normalized, so texts sharing words
/// score higher under cosine similarity.
pub struct FakeEmbedder {
    dims: usize,
}

impl FakeEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let hash = blake3::hash(word.to_lowercase().as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % self.dims;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "fake-embedder"
    }
}
