//! Retry with exponential backoff, jitter, per-attempt timeout, and
//! cancellation short-circuit for provider operations.

use crate::Result;
use crate::error::SubLingoError;
use rand::Rng;
use tokio::time::{Duration, sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Retry configuration for provider operations.
pub struct RetryConfig {
    /// Maximum number of attempts (first try included).
    pub max_attempts: usize,
    /// Initial delay between retries.
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Per-attempt timeout; `None` disables it.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            attempt_timeout: None,
        }
    }
}

impl RetryConfig {
    /// Build a config from the per-provider settings used across the
    /// configuration sections.
    pub fn from_provider(max_retries: u32, retry_delay_ms: u64, timeout_seconds: u64) -> Self {
        Self {
            max_attempts: max_retries as usize + 1,
            base_delay: Duration::from_millis(retry_delay_ms),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            attempt_timeout: Some(Duration::from_secs(timeout_seconds)),
        }
    }
}

/// Retry an operation with exponential backoff and jitter.
///
/// Each attempt is bounded by the per-attempt timeout; cancellation
/// short-circuits immediately, both mid-attempt and mid-backoff. The last
/// error wins when all attempts fail.
pub async fn retry_with_backoff<F, Fut, T>(
    operation: F,
    config: &RetryConfig,
    cancel: &CancellationToken,
    provider: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        if cancel.is_cancelled() {
            return Err(SubLingoError::Canceled);
        }

        let attempt_future = async {
            match config.attempt_timeout {
                Some(limit) => match timeout(limit, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(SubLingoError::Timeout {
                        provider: provider.to_string(),
                        seconds: limit.as_secs(),
                    }),
                },
                None => operation().await,
            }
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(SubLingoError::Canceled),
            result = attempt_future => result,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_canceled() => return Err(e),
            Err(e) => {
                last_error = Some(e);
                if attempt < config.max_attempts - 1 {
                    let delay = backoff_delay(config, attempt);
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(SubLingoError::Canceled),
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| SubLingoError::provider(provider, "retry loop exhausted")))
}

/// Exponential delay with half-width jitter, capped at `max_delay`.
fn backoff_delay(config: &RetryConfig, attempt: usize) -> Duration {
    let exp = config.base_delay.as_millis() as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = exp.min(config.max_delay.as_millis() as f64);
    let jitter = rand::thread_rng().gen_range(0.5..=1.0);
    Duration::from_millis((capped * jitter) as u64)
}
