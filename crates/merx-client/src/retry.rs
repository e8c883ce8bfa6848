//! Exponential backoff retry for transient failures.

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ReconcileError, ReconcileResult};

/// Retry policy configuration.
///
/// Applied only to operations that are safe to repeat: reads and token
/// fetches. Mutating calls are never blind-retried, since a network error
/// cannot prove the call was never delivered.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given retry count and base delay.
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(10),
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Whether the error should be retried at the given attempt number.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &ReconcileError) -> bool {
        attempt < self.max_retries && error.is_transient()
    }

    /// Backoff delay for the given attempt: `base * 2^attempt`, capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exponential.min(self.max_delay)
    }

    /// Execute an async operation, retrying transient failures.
    ///
    /// Retries are logged at `debug`; exhausting the policy logs a `warn`
    /// and returns the last transient error unmodified.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut f: F) -> ReconcileResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ReconcileResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation,
                            attempt = attempt + 1,
                            "operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !self.should_retry(attempt, &error) {
                        if error.is_transient() && attempt >= self.max_retries {
                            warn!(
                                operation,
                                attempts = attempt + 1,
                                error = %error,
                                "retries exhausted"
                            );
                        }
                        return Err(error);
                    }
                    let delay = self.delay_for(attempt);
                    debug!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
