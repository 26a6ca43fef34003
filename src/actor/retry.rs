//! Retry utilities for actor operations with exponential backoff.

use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Create a new retry config with specified parameters
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
        }
    }
}

/// Execute an async operation with exponential backoff retry.
///
/// The operation is retried up to `config.max_retries` times, with exponentially
/// increasing delays between attempts (capped at `config.max_delay`).
///
/// Returns the result of the first successful attempt, or the last error if all
/// retries are exhausted.
///
/// # Example
/// ```ignore
/// let result = with_retry(&config, || async {
///     some_fallible_operation().await
/// }).await;
/// ```
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempts += 1;
                if attempts > config.max_retries {
                    return Err(e);
                }

                tracing::warn!(
                    "Operation failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempts,
                    config.max_retries + 1,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;

                // Exponential backoff with cap
                delay = (delay * 2).min(config.max_delay);
            }
        }
    }
}

/// Reconnect schedule: exponential delays capped at `max_delay`, with an
/// optional limit on consecutive failures after which the caller gives up.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    failures: u32,
}

impl Backoff {
    /// `max_retries == 0` never gives up.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Record a failure. Returns the delay before the next attempt, or `None`
    /// once the failure limit has been reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.config.max_retries != 0 && self.failures > self.config.max_retries {
            return None;
        }

        let exponent = (self.failures - 1).min(16);
        let delay = self
            .config
            .initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.config.max_delay);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
