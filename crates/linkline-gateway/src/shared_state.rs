//! Application context shared by every request handler.
//!
//! Built once at startup and handed to the router as state. Each service is
//! constructed here and nowhere else, so tests can assemble the same graph
//! from fakes through [`SharedState::from_parts`].

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::{
    cache_management::{ResponseCache, ResponseCacheConfig},
    chat::{BotSessions, ChatOutcome, ChatService},
    config::{Config, VectorBackendKind},
    llm::{EmbeddingService, LlmConnectionPool, RetryPolicy},
    memory::{HistoryStore, InMemoryHistoryStore},
    quota::UsageLimiter,
    thread_pool::{ThreadPool, ThreadPoolConfig},
    vector_store::{
        InMemoryVectorBackend, NamespaceSettings, PineconeBackend, VectorBackend,
        VectorNamespaceManager,
    },
};

/// Request and cache counters reported by `/stats`.
#[derive(Default)]
pub struct AtomicCounters {
    pub total_queries: AtomicUsize,
    pub rag_queries: AtomicUsize,
    pub regular_queries: AtomicUsize,
    pub failed_queries: AtomicUsize,
    pub response_time_us: AtomicU64,
    pub documents_processed: AtomicUsize,
    pub cache_hits: AtomicUsize,
    pub cache_misses: AtomicUsize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_queries: usize,
    pub rag_queries: usize,
    pub regular_queries: usize,
    pub failed_queries: usize,
    pub average_response_time_ms: f64,
    pub documents_processed: usize,
    pub active_users: usize,
    pub cache_hit_rate: Option<f64>,
}

impl AtomicCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&self, outcome: &ChatOutcome, elapsed: Duration) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.response_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        let bucket = match outcome {
            ChatOutcome::Reply(reply) if reply.rag_enabled => &self.rag_queries,
            ChatOutcome::Reply(_) => &self.regular_queries,
            ChatOutcome::Failed(_) => &self.failed_queries,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_documents_processed(&self) -> usize {
        self.documents_processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_cache_hit(&self) -> usize {
        self.cache_hits.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_cache_miss(&self) -> usize {
        self.cache_misses.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self, active_users: usize) -> UsageStats {
        let total = self.total_queries.load(Ordering::Relaxed);
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let lookups = hits + self.cache_misses.load(Ordering::Relaxed);
        let average_response_time_ms = if total == 0 {
            0.0
        } else {
            self.response_time_us.load(Ordering::Relaxed) as f64 / 1000.0 / total as f64
        };

        UsageStats {
            total_queries: total,
            rag_queries: self.rag_queries.load(Ordering::Relaxed),
            regular_queries: self.regular_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            average_response_time_ms,
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            active_users,
            cache_hit_rate: (lookups > 0).then(|| hits as f64 / lookups as f64),
        }
    }
}

pub struct SharedState {
    pub config: Arc<Config>,
    pub thread_pool: Arc<ThreadPool>,
    pub llm_pool: Arc<LlmConnectionPool>,
    pub embeddings: Arc<EmbeddingService>,
    pub namespaces: Arc<VectorNamespaceManager>,
    pub chat_service: Arc<ChatService>,
    pub response_cache: ResponseCache,
    pub usage_limiter: Arc<UsageLimiter>,
    pub bot_sessions: Arc<BotSessions>,
    pub counters: Arc<AtomicCounters>,
    pub started_at: Instant,
}

impl SharedState {
    /// Wire every service from configuration.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        info!("Initializing shared application state");

        let thread_pool = Arc::new(ThreadPool::new(ThreadPoolConfig::new(&config)));
        let llm_pool = Arc::new(LlmConnectionPool::from_config(&config));
        let embeddings = Arc::new(EmbeddingService::from_config(&config, thread_pool.clone()));
        let backend: Arc<dyn VectorBackend> = match config.vector_backend {
            VectorBackendKind::Pinecone => Arc::new(PineconeBackend::from_config(&config)?),
            VectorBackendKind::Memory => Arc::new(InMemoryVectorBackend::new()),
        };

        Self::from_parts(config, thread_pool, llm_pool, embeddings, backend)
    }

    pub fn from_parts(
        config: Config,
        thread_pool: Arc<ThreadPool>,
        llm_pool: Arc<LlmConnectionPool>,
        embeddings: Arc<EmbeddingService>,
        backend: Arc<dyn VectorBackend>,
    ) -> anyhow::Result<Self> {
        let namespaces = Arc::new(VectorNamespaceManager::new(
            backend,
            embeddings.clone(),
            thread_pool.clone(),
            NamespaceSettings::from_config(&config),
        )?);
        let histories: Arc<dyn HistoryStore> = Arc::new(InMemoryHistoryStore::new());
        let chat_service = Arc::new(ChatService::new(
            llm_pool.clone(),
            namespaces.clone(),
            histories,
            thread_pool.clone(),
            RetryPolicy::from_config(&config),
        ));

        Ok(Self {
            response_cache: ResponseCache::new(&ResponseCacheConfig::from_config(&config)),
            usage_limiter: Arc::new(UsageLimiter::new(config.daily_group_limit)),
            bot_sessions: Arc::new(BotSessions::new()),
            counters: Arc::new(AtomicCounters::new()),
            started_at: Instant::now(),
            config: Arc::new(config),
            thread_pool,
            llm_pool,
            embeddings,
            namespaces,
            chat_service,
        })
    }

    pub fn stats(&self) -> UsageStats {
        self.counters.snapshot(self.chat_service.active_users())
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Router state. Cloning is cheap.
#[derive(Clone)]
pub struct UnifiedAppState {
    pub shared_state: Arc<SharedState>,
}

impl UnifiedAppState {
    pub fn new(shared_state: Arc<SharedState>) -> Self {
        Self { shared_state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatFailure, ChatReply};

    fn reply(rag_enabled: bool) -> ChatOutcome {
        ChatOutcome::Reply(ChatReply {
            user_id: "u".into(),
            response: "r".into(),
            sources_used: None,
            rag_enabled,
        })
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = AtomicCounters::new();
        assert_eq!(counters.snapshot(0).cache_hit_rate, None);

        counters.record_outcome(&reply(true), Duration::from_millis(30));
        counters.record_outcome(&reply(false), Duration::from_millis(10));
        counters.record_outcome(&ChatOutcome::Failed(ChatFailure::new("x")), Duration::from_millis(20));
        counters.inc_cache_hit();
        counters.inc_cache_miss();
        counters.inc_cache_miss();
        counters.inc_cache_miss();

        let stats = counters.snapshot(2);
        assert_eq!(stats.total_queries, 3);
        assert_eq!(stats.rag_queries, 1);
        assert_eq!(stats.regular_queries, 1);
        assert_eq!(stats.failed_queries, 1);
        assert!((stats.average_response_time_ms - 20.0).abs() < 1e-6);
        assert_eq!(stats.cache_hit_rate, Some(0.25));
        assert_eq!(stats.active_users, 2);
    }

    #[test]
    fn test_state_builds_with_memory_backend() {
        let config = Config {
            vector_backend: VectorBackendKind::Memory,
            openai_api_keys: vec!["sk-test".into()],
            ..Config::default()
        };
        let state = SharedState::new(config).unwrap();
        assert_eq!(state.stats().total_queries, 0);
        assert!(!state.llm_pool.is_initialized());
        assert!(!state.embeddings.is_initialized());
    }
}
