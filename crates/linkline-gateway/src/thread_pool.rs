//! Bounded worker lanes for offloading slow or blocking work.
//!
//! Request handlers never run an LLM call, an embedding call, vector-store
//! I/O or document parsing inline: they hand the job to a lane and await the
//! result. Each lane is bounded by its own semaphore so one kind of work
//! cannot starve another. Lanes nest only downward (an `Llm` job may wait on
//! `Embedding` and `VectorIo` jobs), which keeps a saturated lane from
//! deadlocking the work it depends on.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{GatewayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLane {
    /// Chain invocations (prompting the chat model)
    Llm,
    /// Query and document embedding
    Embedding,
    /// Vector database calls
    VectorIo,
    /// Synchronous document loading and splitting
    Documents,
}

impl WorkerLane {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerLane::Llm => "llm",
            WorkerLane::Embedding => "embedding",
            WorkerLane::VectorIo => "vector-io",
            WorkerLane::Documents => "documents",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    pub llm_workers: usize,
    pub embedding_workers: usize,
    pub vector_io_workers: usize,
    pub document_workers: usize,
}

impl ThreadPoolConfig {
    pub fn new(config: &Config) -> Self {
        let cpu_cores = num_cpus::get();
        let max_workers = config.max_workers.max(1);

        Self {
            llm_workers: max_workers,
            embedding_workers: max_workers.max(2),
            vector_io_workers: (max_workers * 2).max(4),
            document_workers: (cpu_cores / 2).clamp(1, 4),
        }
    }
}

struct Lane {
    lane: WorkerLane,
    permits: Arc<Semaphore>,
    width: usize,
    in_flight: Arc<AtomicUsize>,
}

/// Counts a job as in flight until the task running it ends, even when the
/// caller stops waiting.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Lane {
    fn new(lane: WorkerLane, width: usize) -> Self {
        let width = width.max(1);
        Self {
            lane,
            permits: Arc::new(Semaphore::new(width)),
            width,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }
}

pub struct ThreadPool {
    config: ThreadPoolConfig,
    llm: Lane,
    embedding: Lane,
    vector_io: Lane,
    documents: Lane,
}

impl ThreadPool {
    pub fn new(config: ThreadPoolConfig) -> Self {
        info!("Starting worker pool with config: {:?}", config);
        Self {
            llm: Lane::new(WorkerLane::Llm, config.llm_workers),
            embedding: Lane::new(WorkerLane::Embedding, config.embedding_workers),
            vector_io: Lane::new(WorkerLane::VectorIo, config.vector_io_workers),
            documents: Lane::new(WorkerLane::Documents, config.document_workers),
            config,
        }
    }

    pub fn config(&self) -> &ThreadPoolConfig {
        &self.config
    }

    fn lane(&self, lane: WorkerLane) -> &Lane {
        match lane {
            WorkerLane::Llm => &self.llm,
            WorkerLane::Embedding => &self.embedding,
            WorkerLane::VectorIo => &self.vector_io,
            WorkerLane::Documents => &self.documents,
        }
    }

    /// Run an async job on its own task while holding a permit of `lane`.
    pub async fn spawn<F, T>(&self, lane: WorkerLane, job: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let slot = self.lane(lane);
        let permit = slot
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GatewayError::WorkerPool(format!("{} lane is shut down", lane.name())))?;

        let in_flight = InFlight::enter(&slot.in_flight);
        let handle = tokio::spawn(async move {
            let _permit = permit;
            let _in_flight = in_flight;
            job.await
        });

        handle.await.map_err(|e| {
            GatewayError::WorkerPool(format!("{} job did not complete: {}", lane.name(), e))
        })?
    }

    /// Run synchronous work on the blocking thread pool while holding a permit of `lane`.
    pub async fn spawn_blocking<F, T>(&self, lane: WorkerLane, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let slot = self.lane(lane);
        let permit = slot
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GatewayError::WorkerPool(format!("{} lane is shut down", lane.name())))?;

        let in_flight = InFlight::enter(&slot.in_flight);
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _in_flight = in_flight;
            job()
        });

        handle.await.map_err(|e| {
            GatewayError::WorkerPool(format!("{} blocking job did not complete: {}", lane.name(), e))
        })?
    }

    pub fn in_flight(&self, lane: WorkerLane) -> usize {
        self.lane(lane).in_flight.load(Ordering::Relaxed)
    }

    pub fn available(&self, lane: WorkerLane) -> usize {
        self.lane(lane).permits.available_permits()
    }

    pub fn width(&self, lane: WorkerLane) -> usize {
        self.lane(lane).width
    }

    /// Close every lane. Jobs already running finish; new jobs fail.
    pub fn shutdown(&self) {
        for slot in [&self.llm, &self.embedding, &self.vector_io, &self.documents] {
            slot.permits.close();
            debug!("Closed {} lane", slot.lane.name());
        }
        info!("Worker pool shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn small_pool() -> ThreadPool {
        ThreadPool::new(ThreadPoolConfig {
            llm_workers: 1,
            embedding_workers: 2,
            vector_io_workers: 2,
            document_workers: 1,
        })
    }

    #[tokio::test]
    async fn test_spawn_returns_job_result() {
        let pool = small_pool();
        let value = pool.spawn(WorkerLane::Llm, async { Ok(21 * 2) }).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_spawn_propagates_job_error() {
        let pool = small_pool();
        let result: Result<()> = pool
            .spawn(WorkerLane::VectorIo, async { Err(GatewayError::Backend("down".into())) })
            .await;
        assert!(matches!(result, Err(GatewayError::Backend(_))));
    }

    #[tokio::test]
    async fn test_spawn_blocking_runs_closure() {
        let pool = small_pool();
        let len = pool
            .spawn_blocking(WorkerLane::Documents, || Ok("hello".len()))
            .await
            .unwrap();
        assert_eq!(len, 5);
    }

    #[tokio::test]
    async fn test_lane_width_bounds_concurrency() {
        let pool = Arc::new(small_pool());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.spawn(WorkerLane::Llm, async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(pool.in_flight(WorkerLane::Llm), 0);
    }

    #[tokio::test]
    async fn test_nested_lanes_do_not_deadlock() {
        let pool = Arc::new(small_pool());
        let inner_pool = pool.clone();
        let value = pool
            .spawn(WorkerLane::Llm, async move {
                inner_pool.spawn(WorkerLane::Embedding, async { Ok(7) }).await
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_jobs() {
        let pool = small_pool();
        pool.shutdown();
        let result = pool.spawn(WorkerLane::Embedding, async { Ok(()) }).await;
        assert!(matches!(result, Err(GatewayError::WorkerPool(_))));
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_leak_in_flight() {
        let pool = Arc::new(small_pool());
        let (release, wait) = tokio::sync::oneshot::channel::<()>();

        let caller = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.spawn(WorkerLane::Llm, async move {
                    let _ = wait.await;
                    Ok(())
                })
                .await
            })
        };
        for _ in 0..50 {
            if pool.in_flight(WorkerLane::Llm) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(pool.in_flight(WorkerLane::Llm), 1);

        caller.abort();
        let _ = caller.await;
        release.send(()).unwrap();

        for _ in 0..50 {
            if pool.in_flight(WorkerLane::Llm) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(pool.in_flight(WorkerLane::Llm), 0);
        assert_eq!(pool.available(WorkerLane::Llm), 1);
    }

    #[test]
    fn test_config_derives_from_max_workers() {
        let config = Config { max_workers: 5, ..Config::default() };
        let pool_config = ThreadPoolConfig::new(&config);
        assert_eq!(pool_config.llm_workers, 5);
        assert_eq!(pool_config.vector_io_workers, 10);
        assert!(pool_config.document_workers >= 1);
    }
}
