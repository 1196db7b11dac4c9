//! Per-group vector namespaces over a pluggable vector database.

pub mod backend;
pub mod memory_backend;
pub mod namespace_manager;
pub mod pinecone;
pub mod retriever;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use backend::VectorBackend;
pub use memory_backend::InMemoryVectorBackend;
pub use namespace_manager::{index_name_for_group, NamespaceSettings, VectorNamespaceManager};
pub use pinecone::PineconeBackend;
pub use retriever::{Passage, Retriever};

/// Metadata key under which a record keeps its chunk text.
pub const TEXT_KEY: &str = "text";

pub type Metadata = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    DotProduct,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::DotProduct => "dotproduct",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub host: Option<String>,
    pub ready: bool,
}

/// One knowledge-base search hit. `metadata` no longer carries the chunk text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub metadata: Metadata,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total_results: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceStatus {
    IndexNotFound,
    Empty,
    Active,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseInfo {
    pub total_documents: u64,
    pub total_chunks: u64,
    pub status: NamespaceStatus,
}

impl KnowledgeBaseInfo {
    /// Per-document counts are not tracked, so any vectors count as one document.
    pub fn from_vector_count(vector_count: u64) -> Self {
        Self {
            total_documents: u64::from(vector_count > 0),
            total_chunks: vector_count,
            status: if vector_count > 0 { NamespaceStatus::Active } else { NamespaceStatus::Empty },
        }
    }

    pub fn index_not_found() -> Self {
        Self {
            total_documents: 0,
            total_chunks: 0,
            status: NamespaceStatus::IndexNotFound,
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
