//! Retry logic with exponential backoff.
//!
//! Attempts run sequentially. Between attempts the caller waits
//! `base_delay * 2^attempt`, where `attempt` is 0 for the first retry.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::core::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY};
use crate::error::{Result, TelemetryError};

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt. Default: 3
    pub max_retries: u32,

    /// Delay before the first retry. Default: 1s
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Backoff before retry number `attempt` (0-based): `base_delay * 2^attempt`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

/// Determine if an error is retryable.
pub fn is_retryable(error: &TelemetryError) -> bool {
    error.is_retryable()
}

/// Outcome of a retried operation with the number of attempts made.
#[derive(Debug)]
pub struct RetryResult<T> {
    pub outcome: Result<T>,
    pub attempts: u32,
}

/// Execute an async operation, retrying failures the predicate accepts.
///
/// Stops at the first success, at the first error the predicate rejects, or
/// once `max_retries` retries have failed. The last error is returned.
pub async fn with_retry_detailed<T, F, Fut, P>(
    mut operation: F,
    config: &RetryConfig,
    should_retry: P,
) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&TelemetryError) -> bool,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                return RetryResult {
                    outcome: Ok(value),
                    attempts: attempt + 1,
                }
            }
            Err(e) => {
                if !should_retry(&e) || attempt >= config.max_retries {
                    return RetryResult {
                        outcome: Err(e),
                        attempts: attempt + 1,
                    };
                }

                let delay = config.calculate_delay(attempt);
                tracing::debug!(
                    retry = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after transient failure"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
