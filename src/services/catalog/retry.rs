//! Bounded exponential backoff for catalog requests.

use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Retry policy implementing exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per request, the first try included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Cap for exponential growth and for server-requested delays.
    pub max_backoff: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(config: &Config) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(config.retry_max_backoff_ms),
            ..Self::default()
        }
    }

    /// Delay before retry number `retry_count` (zero based):
    /// `initial_backoff * multiplier^retry_count`, capped at `max_backoff`.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let backoff = self.initial_backoff.as_secs_f64()
            * self.backoff_multiplier.powi(retry_count as i32);
        Duration::from_secs_f64(backoff.min(self.max_backoff.as_secs_f64()))
    }

    /// Whether a failed attempt number `attempt` (one based) may be retried.
    pub fn should_retry(&self, error: &AppError, attempt: u32) -> bool {
        error.is_transient() && attempt < self.max_attempts
    }

    /// A server-requested delay wins over the computed backoff, within the cap.
    fn delay_for(&self, error: &AppError, retry_count: u32) -> Duration {
        match error.retry_after() {
            Some(requested) => requested.min(self.max_backoff),
            None => self.backoff(retry_count),
        }
    }

    /// Runs `operation` until it succeeds, fails permanently, or runs out of
    /// attempts. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if self.should_retry(&e, attempt) => {
                    let delay = self.delay_for(&e, attempt - 1);
                    tracing::warn!(
                        request = %label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient catalog failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(request = %label, attempt, error = %e, "Retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        }
    }
}
