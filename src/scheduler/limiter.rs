//! The single concurrency gate for external inference calls.
//!
//! Bounds in-flight calls with a semaphore, smooths bursts with a fixed
//! inter-call delay after each completion, and serializes retries with
//! backoff while the permit is held. Quota exhaustion is surfaced
//! immediately as its own kind so callers can degrade instead of spinning.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::warn;

use crate::util::error::{ErrorKind, classify_error, is_retryable, retry_hint};
use crate::util::retry::RetryConfig;

/// Default simultaneous calls against the inference service.
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Default pause after each completed call before the next queued one starts.
pub const DEFAULT_INTER_CALL_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct CallSchedulerConfig {
    pub max_concurrency: usize,
    pub inter_call_delay: Duration,
    pub retry: RetryConfig,
}

impl Default for CallSchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            inter_call_delay: DEFAULT_INTER_CALL_DELAY,
            retry: RetryConfig::default(),
        }
    }
}

pub struct CallScheduler {
    semaphore: Arc<Semaphore>,
    inter_call_delay: Duration,
    retry: RetryConfig,
}

impl CallScheduler {
    #[must_use]
    pub fn new(config: CallSchedulerConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            inter_call_delay: config.inter_call_delay,
            retry: config.retry,
        }
    }

    /// Run one external call through the gate.
    ///
    /// The operation closure receives the attempt number (0-based) and is
    /// re-invoked on retryable failures until the attempt ceiling. The
    /// backoff delay honors the provider's retry hint when one is attached
    /// to the error, clamped to the configured bounds.
    pub async fn execute<T, F, Fut>(&self, op_name: &'static str, operation: F) -> Result<T>
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .context("call scheduler semaphore closed")?;

        let mut attempt = 0_usize;
        let outcome = loop {
            match operation(attempt).await {
                Ok(value) => break Ok(value),
                Err(error) => {
                    let next_attempt = attempt + 1;

                    if classify_error(&error) == ErrorKind::QuotaExhausted {
                        warn!(op = op_name, "quota exhausted, not retrying");
                        return Err(error);
                    }

                    if !is_retryable(&error) || !self.retry.can_retry(next_attempt) {
                        break Err(error);
                    }

                    let delay = retry_hint(&error).map_or_else(
                        || self.retry.delay_for_attempt(next_attempt),
                        |hint| self.retry.clamp_hint(hint),
                    );

                    warn!(
                        op = op_name,
                        attempt = next_attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "transient inference failure, retrying"
                    );

                    sleep(delay).await;
                    attempt = next_attempt;
                }
            }
        };

        // Inter-call smoothing: hold the permit through the pause so the
        // next queued call observes the gap.
        if !self.inter_call_delay.is_zero() {
            sleep(self.inter_call_delay).await;
        }

        outcome
    }
}
