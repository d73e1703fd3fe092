// src/quota/tracker.rs
// =============================================================================
// Tracks how many API requests we may still make.
//
// Model:
// - A token bucket holds `capacity` units and refills continuously at
//   capacity / window per second. Refill is lazy: it is computed from the
//   elapsed wall-clock time whenever someone checks or consumes.
// - GitHub also resets the whole quota at `reset_at`. Passing that instant
//   restores the bucket to full and moves `reset_at` to the next window.
// - When the server answers "quota exhausted" the bucket is emptied and
//   frozen (no trickle) until the reported reset.
//
// All state sits behind one async mutex, so concurrent fetches can never
// spend the same unit twice. The mutex is never held across a sleep.
// =============================================================================

use super::clock::Clock;
use crate::config::QuotaConfig;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// Extra second on top of every reset wait; GitHub's reset is rounded down
const RESET_SLACK: Duration = Duration::from_secs(1);

/// Snapshot returned by `check_budget`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub remaining: u32,
    pub reset_at: SystemTime,
}

/// What the quota status endpoint reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: SystemTime,
}

#[derive(Debug)]
struct QuotaState {
    capacity: f64,
    tokens: f64,
    // units per second
    rate: f64,
    last_refill: SystemTime,
    reset_at: SystemTime,
    exhausted: bool,
}

impl QuotaState {
    fn refill(&mut self, now: SystemTime, window: Duration) {
        if now >= self.reset_at {
            self.tokens = self.capacity;
            self.exhausted = false;
            self.last_refill = now;
            self.reset_at = next_reset(self.reset_at, now, window);
            return;
        }

        // Clock went backwards: keep the later refill mark
        let Ok(elapsed) = now.duration_since(self.last_refill) else {
            return;
        };
        self.last_refill = now;

        if self.exhausted {
            return;
        }

        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.capacity);
    }

    // How long until `needed` units could be available
    fn wait_for(&self, needed: f64, now: SystemTime) -> Duration {
        let until_reset = self.reset_at.duration_since(now).unwrap_or_default();
        if self.exhausted || self.rate <= 0.0 {
            return until_reset;
        }
        let missing = (needed - self.tokens).max(0.0);
        Duration::from_secs_f64(missing / self.rate).min(until_reset)
    }
}

// First window boundary strictly after `now`
fn next_reset(reset_at: SystemTime, now: SystemTime, window: Duration) -> SystemTime {
    if window.is_zero() {
        return now;
    }
    let behind = now.duration_since(reset_at).unwrap_or_default();
    let windows = (behind.as_secs_f64() / window.as_secs_f64()).floor() + 1.0;
    reset_at + window.mul_f64(windows)
}

pub struct QuotaTracker {
    state: Mutex<QuotaState>,
    config: QuotaConfig,
    clock: Arc<dyn Clock>,
}

impl QuotaTracker {
    pub fn new(config: QuotaConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let capacity = f64::from(config.capacity);
        let state = QuotaState {
            capacity,
            tokens: capacity,
            rate: rate_for(config.capacity, config.window),
            last_refill: now,
            reset_at: now + config.window,
            exhausted: false,
        };

        Self {
            state: Mutex::new(state),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Seeds the bucket from the quota status endpoint
    pub async fn sync(&self, status: QuotaStatus) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.capacity = f64::from(status.limit);
        state.rate = rate_for(status.limit, self.config.window);
        state.tokens = f64::from(status.remaining.min(status.limit));
        state.reset_at = status.reset_at;
        state.last_refill = now;
        state.exhausted = status.remaining == 0 && status.reset_at > now;

        debug!(
            limit = status.limit,
            remaining = status.remaining,
            "quota synced from status endpoint"
        );
    }

    /// Narrows the local estimate from X-RateLimit-* response headers.
    /// Never raises the token count: other clients share the same quota.
    pub async fn observe(&self, remaining: u32, reset_at: SystemTime) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.refill(now, self.config.window);
        state.tokens = state.tokens.min(f64::from(remaining));
        // While frozen, reset_at is the reported backoff end; a later window
        // reset from an unrelated response must not extend it
        if reset_at > now && !state.exhausted {
            state.reset_at = reset_at;
        }
    }

    /// Remaining units (rounded down) and when the window resets
    pub async fn check_budget(&self) -> Budget {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.refill(now, self.config.window);
        Budget {
            remaining: state.tokens.floor() as u32,
            reset_at: state.reset_at,
        }
    }

    /// Debits `n` units if available. Returns whether it did.
    pub async fn consume(&self, n: u32) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.refill(now, self.config.window);

        let n = f64::from(n);
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Waits until one unit can be consumed, then consumes it.
    pub async fn acquire(&self) -> Result<()> {
        loop {
            if self.consume(1).await {
                return Ok(());
            }

            let wait = {
                let now = self.clock.now();
                let mut state = self.state.lock().await;
                state.refill(now, self.config.window);
                state.wait_for(1.0, now)
            };

            self.check_wait(wait)?;
            debug!(wait_ms = wait.as_millis() as u64, "waiting for quota");
            // Never spin on a zero-length wait
            self.clock.sleep(wait.max(Duration::from_millis(10))).await;
        }
    }

    /// Suspends until at least `threshold` units remain or the window has
    /// reset, then re-checks.
    pub async fn await_budget(&self, threshold: u32) -> Result<()> {
        loop {
            let budget = self.check_budget().await;
            if budget.remaining >= threshold {
                return Ok(());
            }

            let now = self.clock.now();
            let wait = budget.reset_at.duration_since(now).unwrap_or_default() + RESET_SLACK;
            self.check_wait(wait)?;

            info!(
                remaining = budget.remaining,
                threshold,
                wait_secs = wait.as_secs(),
                "approaching API rate limit, waiting for reset"
            );
            self.clock.sleep(wait).await;
        }
    }

    /// Records a quota-exhausted response. Consumption is frozen until
    /// `reset_at`.
    pub async fn record_exhausted(&self, reset_at: SystemTime) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.refill(now, self.config.window);
        state.tokens = 0.0;
        state.exhausted = true;
        state.reset_at = reset_at.max(now);
        state.last_refill = now;
    }

    /// Sleeps until the recorded reset time has passed.
    pub async fn wait_for_reset(&self) -> Result<()> {
        let reset_at = self.state.lock().await.reset_at;
        let wait = reset_at.duration_since(self.clock.now()).unwrap_or_default() + RESET_SLACK;
        self.check_wait(wait)?;

        warn!(wait_secs = wait.as_secs(), "API quota exhausted, backing off until reset");
        self.clock.sleep(wait).await;
        Ok(())
    }

    fn check_wait(&self, wait: Duration) -> Result<()> {
        if wait > self.config.max_wait {
            return Err(Error::QuotaUnreachable {
                wait,
                max_wait: self.config.max_wait,
            });
        }
        Ok(())
    }
}

fn rate_for(limit: u32, window: Duration) -> f64 {
    if window.is_zero() {
        return 0.0;
    }
    f64::from(limit) / window.as_secs_f64()
}
