//! Rate-limit aware retry around chain invocations.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{ChatModel, LlmConnectionPool};
use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::thread_pool::{ThreadPool, WorkerLane};

/// An invocable pipeline bound to one chat-model handle.
#[async_trait]
pub trait Chain: Clone + Send + Sync + 'static {
    type Input: Clone + Send + Sync + 'static;
    type Output: Send + 'static;

    async fn invoke(&self, input: &Self::Input) -> Result<Self::Output>;

    /// The same pipeline driven by a different handle.
    fn rebind(&self, llm: Arc<dyn ChatModel>) -> Self;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub max_jitter: Duration,
    pub transient_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
            transient_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.llm_max_retries,
            ..Self::default()
        }
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// `base * 2^attempt` plus uniform jitter in `[0, max_jitter)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self.backoff_base.saturating_mul(2u32.saturating_pow(attempt));
        let jitter = if self.max_jitter.is_zero() {
            Duration::ZERO
        } else {
            self.max_jitter.mul_f64(rand::thread_rng().gen_range(0.0..1.0))
        };
        exponential + jitter
    }
}

/// Failures that another attempt cannot fix.
fn is_terminal(error: &GatewayError) -> bool {
    matches!(
        error,
        GatewayError::Validation(_)
            | GatewayError::Configuration(_)
            | GatewayError::UnsupportedType(_)
            | GatewayError::QuotaExceeded(_)
    )
}

pub struct RetryExecutor {
    pool: Arc<LlmConnectionPool>,
    thread_pool: Arc<ThreadPool>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(pool: Arc<LlmConnectionPool>, thread_pool: Arc<ThreadPool>, policy: RetryPolicy) -> Self {
        Self { pool, thread_pool, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `chain` on the LLM lane, retrying throttled and transient failures.
    ///
    /// A throttled attempt backs off exponentially and moves the chain to a
    /// randomly chosen pool handle; any other retryable failure waits a fixed
    /// delay. The last error is returned once every attempt is spent.
    pub async fn invoke_with_retry<C: Chain>(&self, chain: C, input: C::Input) -> Result<C::Output> {
        let attempts = self.policy.attempts();
        let mut chain = chain;
        let mut attempt = 0;

        loop {
            let runner = chain.clone();
            let job_input = input.clone();
            let outcome = self
                .thread_pool
                .spawn(WorkerLane::Llm, async move { runner.invoke(&job_input).await })
                .await;

            let error = match outcome {
                Ok(output) => {
                    if attempt > 0 {
                        info!("Chain invocation succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(output);
                }
                Err(e) => e,
            };

            if is_terminal(&error) || attempt + 1 >= attempts {
                return Err(error);
            }

            if error.is_rate_limit() {
                let delay = self.policy.backoff_delay(attempt);
                warn!(
                    "Rate limit hit on attempt {}/{}, waiting {:.2}s before retry",
                    attempt + 1,
                    attempts,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;

                match self.pool.acquire_random().await {
                    Ok(llm) => chain = chain.rebind(llm),
                    Err(e) => warn!("Could not rotate LLM handle, retrying with the same one: {}", e),
                }
            } else {
                warn!(
                    "Chain invocation failed on attempt {}/{}: {}",
                    attempt + 1,
                    attempts,
                    error
                );
                tokio::time::sleep(self.policy.transient_delay).await;
            }

            attempt += 1;
        }
    }
}
