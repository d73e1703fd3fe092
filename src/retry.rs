// src/retry.rs
// =============================================================================
// Exponential backoff for transient network failures.
//
// Quota exhaustion is NOT handled here: a 403 with a reset header is an
// ordinary response, and the GitHub client waits for the reset itself. This
// helper only covers timeouts and dropped connections, i.e. errors where
// Error::is_retryable() is true.
// =============================================================================

use crate::config::RetryConfig;
use crate::error::Error;
use crate::quota::Clock;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `config.max_attempts` retries have been spent. Sleeps go through `clock`.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    clock: &dyn Clock,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "request failed, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                clock.sleep(wait).await;

                delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                    .min(config.max_delay);
            }
            Err(e) => return Err(e),
        }
    }
}

// Uniform jitter between 1x and 2x the delay
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
