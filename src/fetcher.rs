// src/fetcher.rs
// =============================================================================
// Fetches and decodes one file.
//
// The contents endpoint returns the file base64-encoded inside JSON. We
// decode it and keep it only if it is valid UTF-8 text. Outcomes:
//
//   Success  - decoded text, goes into the archive
//   Skipped  - binary / non-UTF-8 / too large: expected, logged at info
//   Failed   - HTTP error or network trouble: logged as a warning
//
// Neither Skipped nor Failed stops the run. Only run-level problems (quota
// unreachable, cancellation) come back as Err.
// =============================================================================

use crate::context::Context;
use crate::error::{Error, Result};
use crate::github::{Reply, RepoId};
use crate::memo::RequestKey;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Outcome of fetching one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    Success { path: String, text: String },
    Skipped { path: String, reason: SkipReason },
    Failed { path: String, kind: FailureKind },
}

impl FetchResult {
    pub fn path(&self) -> &str {
        match self {
            FetchResult::Success { path, .. }
            | FetchResult::Skipped { path, .. }
            | FetchResult::Failed { path, .. } => path,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FetchResult::Success { .. })
    }
}

/// Why a file was left out on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Not base64, or decoded bytes are not UTF-8 (images, archives, ...)
    NonTextContent,
    /// GitHub did not inline the content (files over 1 MB)
    TooLarge,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NonTextContent => write!(f, "non-text-content"),
            SkipReason::TooLarge => write!(f, "too-large"),
        }
    }
}

/// Why a fetch failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureKind {
    /// Non-success HTTP status
    Status(u16),
    /// Connection or timeout error after retries
    Network(String),
    /// Response body was not what the contents endpoint normally returns
    Malformed(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Status(code) => write!(f, "HTTP {}", code),
            FailureKind::Network(message) => write!(f, "network error: {}", message),
            FailureKind::Malformed(message) => write!(f, "malformed response: {}", message),
        }
    }
}

// Fetches one path. The same (repo, branch, path) is only requested once per
// run; concurrent callers share the in-flight request.
pub async fn fetch_content(ctx: &Context, repo: &RepoId, path: &str) -> Result<FetchResult> {
    let key = RequestKey::content(repo, &ctx.branch, path);
    ctx.contents
        .memoize(key, || fetch_uncached(ctx, repo, path))
        .await
}

async fn fetch_uncached(ctx: &Context, repo: &RepoId, path: &str) -> Result<FetchResult> {
    let reply = match ctx.client.contents(repo, &ctx.branch, path).await {
        Ok(reply) => reply,
        Err(e) if !e.is_fatal() => {
            warn!(path, error = %e, "fetch failed");
            return Ok(FetchResult::Failed {
                path: path.to_string(),
                kind: failure_kind(e),
            });
        }
        Err(e) => return Err(e),
    };

    let body = match reply {
        Reply::Ok(body) => body,
        Reply::Status(status) => {
            warn!(path, status = status.as_u16(), "fetch failed");
            return Ok(FetchResult::Failed {
                path: path.to_string(),
                kind: FailureKind::Status(status.as_u16()),
            });
        }
    };

    match decode_content(&body.content, body.encoding.as_deref()) {
        Ok(text) => {
            debug!(path, bytes = text.len(), "fetched");
            Ok(FetchResult::Success {
                path: path.to_string(),
                text,
            })
        }
        Err(reason) => {
            info!(path, %reason, "skipping file");
            Ok(FetchResult::Skipped {
                path: path.to_string(),
                reason,
            })
        }
    }
}

fn failure_kind(error: Error) -> FailureKind {
    match error {
        Error::Malformed(message) => FailureKind::Malformed(message),
        other => FailureKind::Network(other.to_string()),
    }
}

/// Decodes the `content` field of a contents response into text.
///
/// GitHub wraps the base64 payload at 60 columns, so whitespace is stripped
/// before decoding.
pub fn decode_content(encoded: &str, encoding: Option<&str>) -> std::result::Result<String, SkipReason> {
    match encoding {
        Some("none") => return Err(SkipReason::TooLarge),
        Some("base64") | None => {}
        Some(_) => return Err(SkipReason::NonTextContent),
    }

    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|_| SkipReason::NonTextContent)?;
    String::from_utf8(bytes).map_err(|_| SkipReason::NonTextContent)
}
