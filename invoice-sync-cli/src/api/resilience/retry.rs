//! Retry policy with exponential backoff and jitter
//!
//! Every remote HTTP call goes through [`RetryPolicy::execute`]. Transient
//! failures (429 and select 5xx) are retried up to the attempt bound; a
//! server-supplied retry-after hint overrides the exponential delay.

use std::time::Duration;

use log::warn;
use rand::Rng;

use crate::error::SyncError;

/// Retry behaviour configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempt bound, including the first call.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no waiting. For tests.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Applies a [`RetryConfig`] to async operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `op`, retrying retryable failures until the attempt bound is
    /// exhausted. Non-retryable errors propagate immediately.
    pub async fn execute<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    let delay = self.delay_for(attempt, err.retry_after());
                    warn!(
                        "{op_name}: attempt {attempt}/{} failed ({err}), retrying in {:?}",
                        self.config.max_attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Delay before the next attempt. `attempt` is the 1-based number of
    /// the attempt that just failed. A server hint wins over the
    /// exponential default.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint;
        }

        let exponent = attempt.saturating_sub(1);
        let millis = self.config.base_delay.as_millis() as f64
            * self.config.backoff_multiplier.powi(exponent as i32);
        let mut delay = Duration::from_millis(millis as u64).min(self.config.max_delay);

        if self.config.jitter {
            // 75%..125% of the computed delay
            let factor: f64 = rand::rng().random_range(0.75..1.25);
            delay = Duration::from_millis((delay.as_millis() as f64 * factor) as u64);
        }
        delay
    }
}
