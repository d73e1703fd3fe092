// src/scheduler.rs
// =============================================================================
// Runs many fetches at once, but never more than `limit` at a time.
//
// Key functionality:
// - Bounded concurrency with buffer_unordered (backpressure for free: the
//   next fetch only starts when one finishes)
// - Every path is fetched exactly once (duplicates are dropped up front)
// - Each finished fetch is reported to a ProgressObserver immediately
// - A CancellationToken aborts everything still in flight
//
// Results come back in completion order, not submission order.
// =============================================================================

use crate::error::{Error, Result};
use crate::fetcher::FetchResult;
use futures::stream::{self, StreamExt}; // StreamExt gives us .buffer_unordered()
use std::collections::HashSet;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Receives each result as soon as its fetch completes
pub trait ProgressObserver: Send + Sync {
    fn on_result(&self, result: &FetchResult, completed: usize, total: usize);
}

/// Observer that ignores everything
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_result(&self, _result: &FetchResult, _completed: usize, _total: usize) {}
}

// Fetches every path with at most `limit` fetches in flight.
//
// Parameters:
//   paths: files to fetch (duplicates are fetched once)
//   limit: concurrency bound, clamped to at least 1
//   cancel: aborts all in-flight fetches when triggered
//   observer: sees every result as it arrives
//   fetch: fetches one path; Err means the whole run must stop
//
// Dropping the stream drops the in-flight futures, which is how both
// cancellation and a fatal error abort the remaining work.
pub async fn fetch_all<F, Fut>(
    paths: &[String],
    limit: usize,
    cancel: &CancellationToken,
    observer: &dyn ProgressObserver,
    fetch: F,
) -> Result<Vec<FetchResult>>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<FetchResult>>,
{
    let mut seen = HashSet::new();
    let unique: Vec<String> = paths
        .iter()
        .filter(|path| seen.insert(path.as_str()))
        .cloned()
        .collect();

    let total = unique.len();
    let limit = limit.max(1);

    let mut in_flight = stream::iter(unique.into_iter().map(&fetch)).buffer_unordered(limit);
    let mut results = Vec::with_capacity(total);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                warn!(completed = results.len(), total, "cancelled, dropping in-flight fetches");
                return Err(Error::Cancelled);
            }
            next = in_flight.next() => match next {
                Some(Ok(result)) => {
                    debug!(
                        path = result.path(),
                        success = result.is_success(),
                        completed = results.len() + 1,
                        total,
                        "fetch finished"
                    );
                    observer.on_result(&result, results.len() + 1, total);
                    results.push(result);
                    // Nothing left in flight, a late cancel has nothing to abort
                    if results.len() == total {
                        break;
                    }
                }
                Some(Err(e)) => return Err(e),
                None => break,
            },
        }
    }

    Ok(results)
}
