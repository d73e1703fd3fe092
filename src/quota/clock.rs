// src/quota/clock.rs
// =============================================================================
// Wall-clock access for everything that waits on the API quota.
//
// GitHub reports quota resets as epoch seconds, so the pipeline reasons in
// SystemTime rather than Instant. All reads of "now" and every backoff sleep
// go through the Clock trait; production uses SystemClock, tests use
// ManualClock which jumps forward instead of sleeping.
// =============================================================================

use async_trait::async_trait;
use std::time::{Duration, SystemTime};

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> SystemTime;

    /// Suspend the caller for `duration`
    async fn sleep(&self, duration: Duration);
}

/// The real clock: SystemTime::now() and tokio's timer
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// Stand-in for instants SystemTime cannot represent. Any wait until it is
// far beyond max_wait, so such a reset reads as unreachable.
const FAR_FUTURE: Duration = Duration::from_secs(1000 * 365 * 24 * 60 * 60);

// Converts an epoch-seconds value (X-RateLimit-Reset) into a SystemTime
pub fn from_epoch_secs(secs: u64) -> SystemTime {
    add_saturating(SystemTime::UNIX_EPOCH, Duration::from_secs(secs))
}

/// `base + by`, clamped to a far-future instant instead of overflowing on
/// absurd header values
pub fn add_saturating(base: SystemTime, by: Duration) -> SystemTime {
    base.checked_add(by)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}
