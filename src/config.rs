// src/config.rs
// =============================================================================
// Run configuration as plain values.
//
// cli.rs parses arguments and the environment; this module holds what the
// pipeline actually consumes, so the core never reads env vars or argv.
//
// Three pieces:
// - RunConfig: what to rip and where to put it
// - QuotaConfig: how patient to be with the API rate limit
// - RetryConfig: how to back off on flaky network errors
// =============================================================================

use crate::exclusions::ExclusionSet;
use crate::github::RepoId;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Public GitHub REST endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Branch listed when --branch is not given
pub const DEFAULT_BRANCH: &str = "main";

/// Fetches in flight when --concurrency is not given
pub const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Repository to rip
    pub repo: RepoId,
    /// The single branch whose tree is listed
    pub branch: String,
    /// Directory the archive lands in
    pub output_dir: PathBuf,
    /// Substrings that drop a path from the listing
    pub exclusions: ExclusionSet,
    /// Upper bound on concurrent content fetches
    pub concurrency: usize,
    /// List files only; no fetching, no output
    pub dry_run: bool,
    /// Base URL of the REST API (overridable for GitHub Enterprise and tests)
    pub api_url: Url,
    /// Opaque access credential, sent as `Authorization: token ...`
    pub token: Option<String>,
    pub quota: QuotaConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Budget required before the tree listing starts
    pub safety_threshold: u32,
    /// Longest we will sleep for a quota reset before giving up
    pub max_wait: Duration,
    /// Backoff rounds per request when the server keeps answering 403
    pub max_exhaustion_retries: u32,
    /// Bucket size until the quota endpoint tells us the real limit
    pub capacity: u32,
    /// Length of the quota window; refill rate is capacity / window
    pub window: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            safety_threshold: 10,
            // A full hourly window plus a few minutes of clock skew
            max_wait: Duration::from_secs(3900),
            max_exhaustion_retries: 3,
            capacity: 5000,
            window: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Randomize each delay between 1x and 2x
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RunConfig {
    // Builds a config with defaults for everything but the repository
    pub fn new(repo: RepoId) -> Self {
        Self {
            repo,
            branch: DEFAULT_BRANCH.to_string(),
            output_dir: PathBuf::from("."),
            exclusions: ExclusionSet::default(),
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
            api_url: default_api_url(),
            token: None,
            quota: QuotaConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    /// `{output_dir}/{repo name}.txt`
    pub fn output_path(&self) -> PathBuf {
        crate::aggregate::output_path(&self.output_dir, &self.repo)
    }
}

pub fn default_api_url() -> Url {
    Url::parse(DEFAULT_API_URL).expect("DEFAULT_API_URL is a valid URL")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_defaults() {
        let config = RunConfig::new(RepoId::new("rust-lang", "rust"));
        assert_eq!(config.branch, "main");
        assert_eq!(config.concurrency, 8);
        assert!(!config.dry_run);
        assert_eq!(config.api_url.as_str(), "https://api.github.com/");
        assert_eq!(config.output_path(), PathBuf::from("./rust.txt"));
    }

    #[test]
    fn test_quota_defaults_allow_full_window() {
        let quota = QuotaConfig::default();
        assert!(quota.max_wait > quota.window);
        assert_eq!(quota.safety_threshold, 10);
    }
}
