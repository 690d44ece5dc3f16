//! Exponential backoff shared by the embedding client and the batch writer.

use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

use crate::config::{IngestionConfig, MAX_BACKOFF_SECONDS};
use crate::error::{RagError, Result};

/// Suspension point for backoff. Injected so tests can observe delays
/// without sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(duration);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&IngestionConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &IngestionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: bounded_secs(config.backoff_initial_seconds),
            multiplier: config.backoff_multiplier,
            max_delay: bounded_secs(config.backoff_max_seconds),
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Run `op` until it succeeds, fails permanently, or the retry budget is
    /// spent. Only `RagError::Transient` is retried; exhaustion is reported as
    /// `RagError::Exhausted`.
    pub async fn run<T, F, Fut>(&self, sleeper: &dyn Sleeper, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    if attempt > self.max_retries {
                        return Err(RagError::Exhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            last: err.to_string(),
                        });
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts(),
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "transient failure, retrying"
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Seconds to a `Duration`, clamped to `MAX_BACKOFF_SECONDS`. Negative
/// values become zero.
fn bounded_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.min(MAX_BACKOFF_SECONDS)).unwrap_or(Duration::ZERO)
}

pub fn default_sleeper() -> Arc<dyn Sleeper> {
    Arc::new(TokioSleeper)
}
