// src/error.rs
// =============================================================================
// Typed errors for the fetch pipeline.
//
// Only run-level failures live here. Per-file problems (404s, binary files,
// flaky connections) are not errors at all: they become FetchResult::Skipped
// or FetchResult::Failed and the run keeps going.
//
// main.rs converts these into anyhow::Error at the binary boundary.
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The repository argument could not be turned into owner/name
    #[error("invalid repository identifier: {0}")]
    InvalidRepo(String),

    /// Unusable configuration value (API URL, credential)
    #[error("configuration error: {0}")]
    Config(String),

    /// Exclusion list could not be read
    #[error("cannot read exclusion list {path}: {source}")]
    ExclusionFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// --select pointed past the end of the exclusion list
    #[error("exclusion selection {index} is out of range (list has {len} entries)")]
    InvalidSelection { index: usize, len: usize },

    /// Network error from reqwest (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// API response body did not match what we expected
    #[error("malformed API response: {0}")]
    Malformed(String),

    /// The tree listing endpoint could not be reached at all
    #[error("cannot reach listing endpoint for {repo}: {source}")]
    ListingUnreachable {
        repo: String,
        #[source]
        source: reqwest::Error,
    },

    /// Quota reset is further away than we are willing to wait
    #[error("API quota unavailable for {wait:?} (limit for waiting is {max_wait:?})")]
    QuotaUnreachable { wait: Duration, max_wait: Duration },

    /// The server kept reporting exhaustion after every reset
    #[error("API quota still exhausted after {attempts} backoff attempts")]
    QuotaRetriesExhausted { attempts: u32 },

    /// Output artifact could not be written
    #[error("cannot write output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Ctrl-C or --timeout
    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    /// Transient failures worth another attempt: timeouts and refused or
    /// reset connections. Everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Fatal errors abort the whole run instead of just one path.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Network(_) | Error::Malformed(_))
    }
}
