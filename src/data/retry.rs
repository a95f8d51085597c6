//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::FetchError;
use crate::metrics;

/// Retry configuration for provider fetches.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_s: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Config::default().retry_policy()
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Calculate next delay with exponential backoff.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let max_delay_ms = self.max_delay_s.saturating_mul(1000);
        let clamped_ms = delay_ms.min(max_delay_ms as f64) as u64;
        Duration::from_millis(clamped_ms)
    }

    /// Delay before the next attempt, honoring a provider's retry-after hint
    /// up to the maximum delay.
    fn delay_after(&self, attempt: u32, error: &FetchError) -> Duration {
        let backoff = self.next_delay(attempt);
        match error {
            FetchError::RateLimited {
                retry_after_seconds: Some(secs),
                ..
            } => backoff
                .max(Duration::from_secs(*secs))
                .min(Duration::from_secs(self.max_delay_s)),
            _ => backoff,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The last error is returned on failure.
    pub async fn execute<T, F, Fut>(&self, provider: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            metrics::inc_fetch_attempts(provider);
            let start = Instant::now();
            let outcome = op().await;
            metrics::record_fetch_latency(start, provider);

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            attempt += 1;
            if !error.is_retryable() {
                debug!(provider, error = %error, "Fetch failed, not retryable");
                return Err(error);
            }
            if attempt >= max_attempts {
                warn!(provider, attempts = attempt, error = %error, "Retry budget exhausted");
                return Err(error);
            }

            let delay = self.delay_after(attempt - 1, &error);
            metrics::inc_fetch_retries(provider);
            debug!(
                provider,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying fetch after delay"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
