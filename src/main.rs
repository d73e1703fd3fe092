// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Load .env, parse command-line arguments using clap, set up logging
// 2. Load the exclusion list (and print it, for --show-exclusions)
// 3. Run the pipeline: quota check, listing, concurrent fetches, archive
// 4. Print a summary and exit with proper code
//    (0 = success, 1 = some files failed, 2 = error)
//
// Logs go to stderr through `tracing`; the summary goes to stdout so
// `--json` output can be piped straight into other tools.
// =============================================================================

// Module declarations - tells Rust about our other source files
mod aggregate;     // src/aggregate.rs - archive rendering and atomic write
mod cli;           // src/cli.rs - command-line parsing
mod config;        // src/config.rs - run, quota and retry settings
mod context;       // src/context.rs - per-run shared state
mod error;         // src/error.rs - error type
mod exclusions;    // src/exclusions.rs - exclusion list loading/filtering
mod fetcher;       // src/fetcher.rs - fetch + decode one file
mod github;        // src/github/ - GitHub API client
mod lister;        // src/lister.rs - repository tree listing
mod memo;          // src/memo.rs - request coalescing
mod pipeline;      // src/pipeline.rs - one complete run
mod quota;         // src/quota/ - rate limit tracking
mod retry;         // src/retry.rs - backoff for transient errors
mod scheduler;     // src/scheduler.rs - bounded concurrent fetching

use anyhow::{Context as _, Result};
use clap::Parser; // Parser trait enables the parse() method
use cli::Cli;
use config::RunConfig;
use fetcher::FetchResult;
use github::RepoId;
use pipeline::RunSummary;
use quota::SystemClock;
use scheduler::{NoProgress, ProgressObserver};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // A missing .env is fine; real environment variables still apply
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            // {:#} prints the whole context chain on one line
            eprintln!("Error: {:#}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

// RUST_LOG wins if set; otherwise -v / -vv pick the level
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "repo_ripper=info",
        1 => "repo_ripper=debug",
        _ => "repo_ripper=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// Returns:
//   Ok(0) = archive written, nothing failed
//   Ok(1) = archive written, but some files could not be fetched
//   Err   = fatal error (exit code 2)
async fn run(cli: Cli) -> Result<i32> {
    let (exclusion_file, explicit) = cli.exclusion_file();
    let list = exclusions::load_list(&exclusion_file, explicit)?;

    if cli.show_exclusions {
        print_exclusions(&list);
        return Ok(0);
    }

    let mut chosen = exclusions::select(&list, &cli.select)?;
    chosen.extend(cli.exclude.iter().cloned());
    if chosen.is_empty() {
        debug!("no exclusions apply");
    } else {
        debug!(count = chosen.len(), patterns = ?chosen.iter().collect::<Vec<_>>(), "exclusions");
    }

    // clap guarantees a repo unless --show-exclusions was given
    let input = cli.repo.as_deref().context("a repository is required")?;
    let repo = RepoId::parse(input)?;

    let mut config = RunConfig::new(repo);
    config.branch = cli.branch;
    config.output_dir = cli.output_dir;
    config.exclusions = chosen;
    config.concurrency = cli.concurrency;
    config.dry_run = cli.dry_run;
    config.api_url = cli.api_url;
    config.token = cli.token;
    config.quota.max_wait = Duration::from_secs(cli.max_wait);

    if config.token.is_none() {
        warn!("no GITHUB_TOKEN set, unauthenticated requests are limited to 60 per hour");
    }

    info!(
        repo = %config.repo,
        branch = %config.branch,
        output = %config.output_path().display(),
        "ripping repository"
    );

    let cancel = CancellationToken::new();
    spawn_cancel_triggers(&cancel, cli.timeout);

    // --json keeps stderr free of the progress counter
    let observer: &dyn ProgressObserver = if cli.json { &NoProgress } else { &ConsoleProgress };
    let summary = pipeline::run(&config, Arc::new(SystemClock), cancel, observer).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        eprintln!(); // end the progress line
        print_summary(&summary, &config);
    }

    if summary.failed.is_empty() {
        Ok(0)
    } else {
        Ok(1) // Exit code 1 = archive written, but incomplete
    }
}

// Ctrl-C and --timeout both cancel the same token
fn spawn_cancel_triggers(cancel: &CancellationToken, timeout: Option<u64>) {
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            token.cancel();
        }
    });

    if let Some(secs) = timeout {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(timeout_secs = secs, "timeout reached, cancelling");
            token.cancel();
        });
    }
}

// Prints the numbered list that --select refers to
fn print_exclusions(list: &[String]) {
    if list.is_empty() {
        println!("⚠️  Exclusion list is empty");
        return;
    }
    println!("📋 Exclusion list:");
    for (i, pattern) in list.iter().enumerate() {
        println!("   {:>3}. {}", i + 1, pattern);
    }
}

// Single-line "fetched 12/40" counter on stderr
struct ConsoleProgress;

impl ProgressObserver for ConsoleProgress {
    fn on_result(&self, result: &FetchResult, completed: usize, total: usize) {
        let mark = match result {
            FetchResult::Success { .. } => "✅",
            FetchResult::Skipped { .. } => "⏭️ ",
            FetchResult::Failed { .. } => "❌",
        };
        let mut stderr = std::io::stderr().lock();
        // Progress output is best effort
        let _ = write!(stderr, "\r{} {}/{} files", mark, completed, total);
        let _ = stderr.flush();
    }
}

// Prints the run summary as a human-readable table
fn print_summary(summary: &RunSummary, config: &RunConfig) {
    if config.dry_run {
        println!("📄 {} file(s) would be fetched from {}:", summary.listed, summary.repo);
        for file in &summary.files {
            println!("   {}", file);
        }
        return;
    }

    if !summary.skipped.is_empty() || !summary.failed.is_empty() {
        println!("{:<60} {:<15} {:<30}", "PATH", "STATUS", "REASON");
        println!("{}", "=".repeat(105));
        for note in &summary.skipped {
            println!("{:<60} {:<15} {:<30}", truncate(&note.path), "⏭️  SKIPPED", note.reason);
        }
        for note in &summary.failed {
            println!("{:<60} {:<15} {:<30}", truncate(&note.path), "❌ FAILED", note.reason);
        }
        println!();
    }

    println!("📊 Summary for {} ({}):", summary.repo, summary.branch);
    println!("   📋 Listed: {}", summary.listed);
    println!("   ✅ Written: {}", summary.written);
    println!("   ⏭️  Skipped: {}", summary.skipped.len());
    println!("   ❌ Failed: {}", summary.failed.len());
    if let Some(output) = &summary.output {
        println!("   💾 Archive: {}", output.display());
    }
}

// Long paths keep their tail, which is the informative part
fn truncate(path: &str) -> String {
    let chars: Vec<char> = path.chars().collect();
    if chars.len() > 57 {
        let tail: String = chars[chars.len() - 54..].iter().collect();
        format!("...{}", tail)
    } else {
        path.to_string()
    }
}
