//! Retry logic for transient HTTP failures

use crate::error::ResolveError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Delay to wait before retry number `attempt` (0-based), without jitter
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(attempt as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        Duration::from_millis(millis as u64).min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return delay;
        }
        let range = delay.as_millis() as f64 * self.jitter_factor;
        let jitter = rand::random::<f64>() * range;
        (delay + Duration::from_millis(jitter as u64)).min(self.max_delay)
    }
}

/// Retry executor
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new retry executor with configuration
    pub fn with_config(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or retries run out
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T, ResolveError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResolveError>>,
    {
        self.execute_with_policy(op, ResolveError::is_retryable).await
    }

    /// Same as [`execute`](Self::execute) with a caller-supplied retry predicate
    pub async fn execute_with_policy<F, Fut, T, P>(
        &self,
        mut op: F,
        should_retry: P,
    ) -> Result<T, ResolveError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ResolveError>>,
        P: Fn(&ResolveError) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if attempt < self.config.max_retries && should_retry(&error) => {
                    let delay = self.config.jittered(self.config.backoff_delay(attempt));
                    debug!(
                        "Attempt {}/{} failed ({}), retrying in {:?}",
                        attempt + 1,
                        self.config.max_retries + 1,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Retry configuration builder
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retries
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Set initial delay
    pub fn initial_delay(mut self, initial_delay: Duration) -> Self {
        self.config.initial_delay = initial_delay;
        self
    }

    /// Set maximum delay
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.config.max_delay = max_delay;
        self
    }

    /// Set backoff multiplier
    pub fn backoff_multiplier(mut self, backoff_multiplier: f64) -> Self {
        self.config.backoff_multiplier = backoff_multiplier;
        self
    }

    /// Set jitter factor, clamped to `0.0..=1.0`
    pub fn jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.config.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    pub fn build(self) -> RetryConfig {
        self.config
    }
}
