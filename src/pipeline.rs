// src/pipeline.rs
// =============================================================================
// One complete run, start to finish:
//
//   quota check -> tree listing -> bounded concurrent fetches -> archive
//
// 1. Query the quota once and wait if fewer than `safety_threshold`
//    requests remain
// 2. List the branch, minus excluded paths
// 3. Fetch every file (at most `concurrency` at a time)
// 4. Write the successful ones into `{output_dir}/{repo}.txt`
//
// A dry run stops after step 2 and reports the listing.
// =============================================================================

use crate::aggregate::{aggregate, write_artifact};
use crate::config::RunConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::fetcher::{fetch_content, FetchResult};
use crate::lister::list_files;
use crate::quota::Clock;
use crate::scheduler::{fetch_all, ProgressObserver};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What a run did, printed as a table or JSON by main.rs
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub repo: String,
    pub branch: String,
    /// Files left after exclusion filtering
    pub listed: usize,
    /// Blocks written to the archive
    pub written: usize,
    pub skipped: Vec<PathNote>,
    pub failed: Vec<PathNote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// The listing itself, only filled in for dry runs
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

/// A path left out of the archive and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathNote {
    pub path: String,
    pub reason: String,
}

pub async fn run(
    config: &RunConfig,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    observer: &dyn ProgressObserver,
) -> Result<RunSummary> {
    let ctx = Context::new(config, clock)?;

    // Covers the quota wait and the listing; the scheduler watches the
    // token itself so it can report how far it got
    let (mut summary, results) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        gathered = gather(&ctx, config, &cancel, observer) => gathered?,
    };

    let Some(results) = results else {
        return Ok(summary);
    };

    // Every fetch is done, so the run is committed: the archive is written
    // even if cancellation arrives now. A run that returns Cancelled never
    // leaves an archive behind.
    let (skipped, failed) = left_out(&results);
    summary.skipped = skipped;
    summary.failed = failed;

    let artifact = aggregate(results);
    if artifact.is_empty() {
        warn!(repo = %config.repo, "no text files fetched, writing an empty archive");
    }
    summary.written = artifact.len();
    let output = write_artifact(&config.output_dir, &config.repo, &artifact).await?;
    info!(
        path = %output.display(),
        blocks = artifact.len(),
        requests = ctx.contents.len().await,
        "archive written"
    );
    summary.output = Some(output);

    Ok(summary)
}

// Quota gate, listing and fetches. Results are None for a dry run.
async fn gather(
    ctx: &Context,
    config: &RunConfig,
    cancel: &CancellationToken,
    observer: &dyn ProgressObserver,
) -> Result<(RunSummary, Option<Vec<FetchResult>>)> {
    ensure_budget(ctx).await?;

    let files = list_files(ctx, &config.repo, &config.exclusions).await?;
    let mut summary = RunSummary {
        repo: config.repo.full_name(),
        branch: config.branch.clone(),
        listed: files.len(),
        written: 0,
        skipped: Vec::new(),
        failed: Vec::new(),
        output: None,
        files: Vec::new(),
    };

    if config.dry_run {
        summary.files = files.as_ref().clone();
        return Ok((summary, None));
    }

    info!(files = files.len(), concurrency = config.concurrency, "fetching contents");
    let results = fetch_all(&files, config.concurrency, cancel, observer, move |path| async move {
        fetch_content(ctx, &config.repo, &path).await
    })
    .await?;

    Ok((summary, Some(results)))
}

// Seeds the quota tracker from the status endpoint, then waits until at
// least the safety threshold is available
async fn ensure_budget(ctx: &Context) -> Result<()> {
    match ctx.client.rate_limit().await {
        Ok(status) => ctx.quota.sync(status).await,
        Err(e) if !e.is_fatal() => {
            warn!(error = %e, "could not query API quota, assuming defaults");
        }
        Err(e) => return Err(e),
    }

    let budget = ctx.quota.check_budget().await;
    let reset = budget
        .reset_at
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    info!(remaining = budget.remaining, reset = reset.as_secs(), "API quota");

    ctx.quota
        .await_budget(ctx.quota.config().safety_threshold)
        .await
}

// Skipped and failed paths, sorted for stable output
fn left_out(results: &[FetchResult]) -> (Vec<PathNote>, Vec<PathNote>) {
    let mut skipped = Vec::new();
    let mut failed = Vec::new();

    for result in results {
        match result {
            FetchResult::Success { .. } => {}
            FetchResult::Skipped { path, reason } => skipped.push(PathNote {
                path: path.clone(),
                reason: reason.to_string(),
            }),
            FetchResult::Failed { path, kind } => failed.push(PathNote {
                path: path.clone(),
                reason: kind.to_string(),
            }),
        }
    }

    skipped.sort_by(|a, b| a.path.cmp(&b.path));
    failed.sort_by(|a, b| a.path.cmp(&b.path));
    (skipped, failed)
}
