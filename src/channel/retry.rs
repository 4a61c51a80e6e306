//! Exponential backoff for channel requests.
//!
//! Only transient errors (see [`ChannelError::is_transient`]) are retried.
//! The default schedule is 3 retries after 1s, 2s and 4s.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::ChannelError;

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap for exponential growth.
    pub max_delay: Duration,

    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// 3 retries with 1s, 2s, 4s delays.
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(8),
        backoff_multiplier: 2.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Computes the delay before retry `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    /// Returns an iterator over all retry delays.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Whether to retry at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPolicy {
    #[default]
    RetryTransient,

    NoRetry,
}

/// Runs `operation` until it succeeds, fails permanently, or runs out of
/// retries. The last error is returned in the latter two cases.
pub async fn retry_with_backoff<T, F, Fut>(
    config: RetryConfig,
    policy: RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, ChannelError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChannelError>>,
{
    let max_attempts = match policy {
        RetryPolicy::NoRetry => 1,
        RetryPolicy::RetryTransient => config.max_retries + 1,
    };
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if !e.is_transient() || attempt >= max_attempts {
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempt - 1);
                warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient channel error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
