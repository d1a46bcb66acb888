//! Backoff for provider reads.
//!
//! Verification is a read, so a call the provider never answered can be
//! repeated. Initialization creates provider state and never goes through
//! here.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::GatewayResult;

/// How many times, and how far apart, to repeat a provider read.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first call and is at least one.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Policy described by the `[retry]` config table.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay, config.max_delay)
    }

    /// Call once, never repeat.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Maximum number of calls.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause before repeat number `retry` (1-based): the base delay doubled
    /// per repeat, capped, then spread by a quarter either way.
    pub fn backoff(&self, retry: u32) -> Duration {
        let doubled = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)));
        let capped = doubled.min(self.max_delay);

        let spread = capped / 4;
        if spread.is_zero() {
            return capped;
        }
        let low = capped - spread;
        rand::thread_rng().gen_range(low..=capped + spread)
    }

    /// Run `read` until it succeeds, fails in a way a repeat cannot fix, or
    /// the attempts run out. `label` names the read in logs.
    pub async fn run<F, Fut, T>(&self, label: &str, mut read: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let mut attempt = 1;
        loop {
            let err = match read().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if !err.is_retryable() || attempt >= self.max_attempts {
                return Err(err);
            }

            let pause = self.backoff(attempt);
            warn!(
                label,
                attempt,
                max_attempts = self.max_attempts,
                error = %err,
                "Provider did not answer, retrying"
            );
            debug!(label, ?pause, "Backing off");
            tokio::time::sleep(pause).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
