use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{Metadata, ScoredMatch, VectorBackend, TEXT_KEY};
use crate::error::Result;
use crate::llm::EmbeddingService;
use crate::thread_pool::{ThreadPool, WorkerLane};

/// A retrieved chunk of a source document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub content: String,
    pub metadata: Metadata,
    pub score: f32,
}

impl Passage {
    pub fn source_file(&self) -> Option<&str> {
        self.metadata.get("source_file").and_then(Value::as_str)
    }
}

impl From<ScoredMatch> for Passage {
    fn from(scored: ScoredMatch) -> Self {
        let mut metadata = scored.metadata;
        let content = match metadata.remove(TEXT_KEY) {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Self { content, metadata, score: scored.score }
    }
}

/// Query handle bound to one group's namespace.
#[derive(Clone)]
pub struct Retriever {
    backend: Arc<dyn VectorBackend>,
    embeddings: Arc<EmbeddingService>,
    thread_pool: Arc<ThreadPool>,
    index_name: String,
    namespace: String,
    k: usize,
}

impl Retriever {
    pub(crate) fn new(
        backend: Arc<dyn VectorBackend>,
        embeddings: Arc<EmbeddingService>,
        thread_pool: Arc<ThreadPool>,
        index_name: String,
        namespace: String,
        k: usize,
    ) -> Self {
        Self { backend, embeddings, thread_pool, index_name, namespace, k }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// The `k` passages closest to `query`, best first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<Passage>> {
        self.retrieve_top(query, self.k).await
    }

    pub async fn retrieve_top(&self, query: &str, top_k: usize) -> Result<Vec<Passage>> {
        let vector = self.embeddings.embed_query(query).await?;

        let backend = self.backend.clone();
        let index = self.index_name.clone();
        let namespace = self.namespace.clone();
        let matches = self
            .thread_pool
            .spawn(WorkerLane::VectorIo, async move {
                backend.query(&index, &namespace, vector, top_k).await
            })
            .await?;

        debug!("Retrieved {} passage(s) from {}/{}", matches.len(), self.index_name, self.namespace);
        Ok(matches.into_iter().map(Passage::from).collect())
    }
}
