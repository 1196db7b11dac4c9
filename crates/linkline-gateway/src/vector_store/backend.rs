use async_trait::async_trait;

use super::{DistanceMetric, IndexDescription, ScoredMatch, VectorRecord};
use crate::error::Result;

/// The vector database as seen by the namespace manager.
///
/// Calls may block on the network for a long time; callers run them on the
/// vector I/O lane.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn list_indexes(&self) -> Result<Vec<String>>;

    /// Create an index. Creating one that already exists succeeds.
    async fn create_index(&self, name: &str, dimension: usize, metric: DistanceMetric) -> Result<()>;

    async fn describe_index(&self, name: &str) -> Result<IndexDescription>;

    async fn index_ready(&self, name: &str) -> Result<bool> {
        Ok(self.describe_index(name).await?.ready)
    }

    async fn upsert(&self, index: &str, namespace: &str, records: Vec<VectorRecord>) -> Result<usize>;

    async fn query(
        &self,
        index: &str,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>>;

    async fn namespace_vector_count(&self, index: &str, namespace: &str) -> Result<u64>;

    async fn delete_namespace(&self, index: &str, namespace: &str) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}
