//! Process-local vector database for development and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{cosine_similarity, DistanceMetric, IndexDescription, ScoredMatch, VectorBackend, VectorRecord};
use crate::error::{GatewayError, Result};

struct MemoryIndex {
    dimension: usize,
    metric: DistanceMetric,
    created_at: Instant,
    namespaces: HashMap<String, Vec<VectorRecord>>,
}

impl MemoryIndex {
    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::Cosine => cosine_similarity(a, b),
            DistanceMetric::DotProduct => a.iter().zip(b).map(|(x, y)| x * y).sum(),
            DistanceMetric::Euclidean => {
                -a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryVectorBackend {
    indexes: Arc<DashMap<String, MemoryIndex>>,
    ready_after: Duration,
    creations: Arc<AtomicUsize>,
}

impl InMemoryVectorBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes report ready only once `delay` has passed since creation.
    pub fn with_ready_delay(delay: Duration) -> Self {
        Self {
            ready_after: delay,
            ..Self::default()
        }
    }

    /// How many indexes were actually created.
    pub fn creation_count(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    fn missing(name: &str) -> GatewayError {
        GatewayError::Backend(format!("Index '{}' not found", name))
    }
}

#[async_trait]
impl VectorBackend for InMemoryVectorBackend {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.indexes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn create_index(&self, name: &str, dimension: usize, metric: DistanceMetric) -> Result<()> {
        self.indexes.entry(name.to_string()).or_insert_with(|| {
            self.creations.fetch_add(1, Ordering::SeqCst);
            debug!("In-memory index '{}' created ({} dims, {})", name, dimension, metric.as_str());
            MemoryIndex {
                dimension,
                metric,
                created_at: Instant::now(),
                namespaces: HashMap::new(),
            }
        });
        Ok(())
    }

    async fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        let index = self.indexes.get(name).ok_or_else(|| Self::missing(name))?;
        Ok(IndexDescription {
            name: name.to_string(),
            host: None,
            ready: index.created_at.elapsed() >= self.ready_after,
        })
    }

    async fn upsert(&self, index: &str, namespace: &str, records: Vec<VectorRecord>) -> Result<usize> {
        let mut entry = self.indexes.get_mut(index).ok_or_else(|| Self::missing(index))?;
        if let Some(bad) = records.iter().find(|r| r.values.len() != entry.dimension) {
            return Err(GatewayError::Backend(format!(
                "Vector '{}' has dimension {}, index '{}' expects {}",
                bad.id,
                bad.values.len(),
                index,
                entry.dimension
            )));
        }

        let count = records.len();
        let stored = entry.namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            match stored.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record,
                None => stored.push(record),
            }
        }
        Ok(count)
    }

    async fn query(
        &self,
        index: &str,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredMatch>> {
        let entry = self.indexes.get(index).ok_or_else(|| Self::missing(index))?;
        let Some(records) = entry.namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<ScoredMatch> = records
            .iter()
            .map(|record| ScoredMatch {
                id: record.id.clone(),
                score: entry.score(&vector, &record.values),
                metadata: record.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn namespace_vector_count(&self, index: &str, namespace: &str) -> Result<u64> {
        let entry = self.indexes.get(index).ok_or_else(|| Self::missing(index))?;
        Ok(entry.namespaces.get(namespace).map(|r| r.len() as u64).unwrap_or(0))
    }

    async fn delete_namespace(&self, index: &str, namespace: &str) -> Result<()> {
        let mut entry = self.indexes.get_mut(index).ok_or_else(|| Self::missing(index))?;
        entry.namespaces.remove(namespace);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
