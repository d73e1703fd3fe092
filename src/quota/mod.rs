// src/quota/mod.rs
// =============================================================================
// API rate-limit bookkeeping.
//
// Submodules:
// - clock: the Clock seam (real time in production, manual time in tests)
// - tracker: the QuotaTracker token bucket and its wait/backoff policies
//
// Every request the GitHub client sends consumes one unit here first.
// =============================================================================

mod clock;
mod tracker;

pub use clock::{add_saturating, from_epoch_secs, Clock, SystemClock};
pub use tracker::{QuotaStatus, QuotaTracker};

#[cfg(test)]
pub use clock::testing;
