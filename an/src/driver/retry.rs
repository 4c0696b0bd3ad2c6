//! Bounded retry for provider calls

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::DriverConfig;
use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError};

/// Exponential backoff with jitter, bounded by attempt count
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Backoff before the second attempt
    pub initial_backoff: Duration,

    /// Cap on any computed backoff
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    /// Delay before attempt `attempt + 1` after `error` ended attempt `attempt`
    ///
    /// A provider-supplied retry-after is honoured up to `max_backoff`.
    /// Otherwise the delay doubles per attempt up to `max_backoff`, then is
    /// scaled by a random factor in [0.5, 1.0].
    pub fn delay_for(&self, attempt: u32, error: &LlmError) -> Duration {
        if let Some(retry_after) = error.retry_after() {
            if retry_after > self.max_backoff {
                debug!(?retry_after, max_backoff = ?self.max_backoff, "RetryPolicy::delay_for: clamping retry-after");
            }
            return retry_after.min(self.max_backoff);
        }
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self.initial_backoff.saturating_mul(1 << exponent).min(self.max_backoff);
        let factor: f64 = rand::rng().random_range(0.5..=1.0);
        base.mul_f64(factor)
    }

    /// Send `request`, retrying transient failures
    pub async fn complete(
        &self,
        client: &dyn LlmClient,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let mut attempt = 1;
        loop {
            debug!(%attempt, max_attempts = %self.max_attempts, "RetryPolicy::complete: sending");
            match client.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt, &e);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(%attempt, error = %e, retryable = e.is_retryable(), "RetryPolicy::complete: giving up");
                    return Err(e);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DriverConfig::default())
    }
}
