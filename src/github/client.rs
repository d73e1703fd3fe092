// src/github/client.rs
// =============================================================================
// Thin client for the three GitHub REST endpoints we need:
//
//   GET /rate_limit                                  quota status
//   GET /repos/{owner}/{repo}/git/trees/{branch}     recursive file listing
//   GET /repos/{owner}/{repo}/contents/{path}        one file, base64-encoded
//
// Every listing/content request:
// 1. takes one unit from the QuotaTracker (waiting if the bucket is empty)
// 2. is sent with exponential backoff on connect/timeout errors
// 3. feeds the X-RateLimit-* headers back into the tracker
// 4. on a quota-exhausted answer (403/429 + reset header) sleeps until the
//    reset and sends the same request again, a bounded number of times
//
// Callers get a Reply: either the parsed body or the non-success status.
// =============================================================================

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::quota::{add_saturating, from_epoch_secs, Clock, QuotaStatus, QuotaTracker};
use crate::retry::with_retry;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};
use url::Url;

use super::RepoId;

const RATE_REMAINING: &str = "x-ratelimit-remaining";
const RATE_RESET: &str = "x-ratelimit-reset";

/// Outcome of an API call that reached the server
#[derive(Debug)]
pub enum Reply<T> {
    Ok(T),
    Status(StatusCode),
}

/// One entry of a recursive tree listing
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    /// "blob" for files, "tree" for directories, "commit" for submodules
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct TreeListing {
    #[serde(default)]
    pub tree: Vec<TreeEntry>,
    /// GitHub stops listing very large trees and sets this flag
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Deserialize)]
pub struct FileContent {
    #[serde(default)]
    pub content: String,
    /// "base64", or "none" when the file is too large to inline
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    rate: RateLimitEntry,
}

#[derive(Debug, Deserialize)]
struct RateLimitEntry {
    limit: u32,
    remaining: u32,
    reset: u64,
}

pub struct GitHubClient {
    http: Client,
    api_url: Url,
    quota: Arc<QuotaTracker>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
}

impl GitHubClient {
    pub fn new(
        api_url: &Url,
        token: Option<&str>,
        quota: Arc<QuotaTracker>,
        clock: Arc<dyn Clock>,
        retry: RetryConfig,
    ) -> Result<Self> {
        if api_url.cannot_be_a_base() {
            return Err(Error::Config(format!("API URL cannot be a base: {}", api_url)));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("repo-ripper/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("token {}", token))
                .map_err(|_| Error::Config("access token contains invalid characters".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.clone(),
            quota,
            clock,
            retry,
        })
    }

    // Queries the quota status endpoint. GitHub does not count this call
    // against the quota, so it skips the tracker.
    pub async fn rate_limit(&self) -> Result<QuotaStatus> {
        let url = self.endpoint(&["rate_limit"]);
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Malformed(format!(
                "quota status endpoint answered HTTP {}",
                status.as_u16()
            )));
        }

        let body: RateLimitBody = parse_body(&response.bytes().await?)?;
        Ok(QuotaStatus {
            limit: body.rate.limit,
            remaining: body.rate.remaining,
            reset_at: from_epoch_secs(body.rate.reset),
        })
    }

    /// Recursive listing of `branch`
    pub async fn tree(&self, repo: &RepoId, branch: &str) -> Result<Reply<TreeListing>> {
        let mut url = self.endpoint(&["repos", &repo.owner, &repo.name, "git", "trees"]);
        extend_path(&mut url, branch);
        url.query_pairs_mut().append_pair("recursive", "1");
        self.get_json(url).await
    }

    /// Contents of one file at `branch`
    pub async fn contents(
        &self,
        repo: &RepoId,
        branch: &str,
        path: &str,
    ) -> Result<Reply<FileContent>> {
        let mut url = self.endpoint(&["repos", &repo.owner, &repo.name, "contents"]);
        extend_path(&mut url, path);
        url.query_pairs_mut().append_pair("ref", branch);
        self.get_json(url).await
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        // new() rejected cannot-be-a-base URLs
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Reply<T>> {
        let mut exhaustions = 0;

        loop {
            self.quota.acquire().await?;

            let response = with_retry(&self.retry, self.clock.as_ref(), || {
                let request = self.http.get(url.clone());
                async move { request.send().await.map_err(Error::Network) }
            })
            .await?;

            let status = response.status();
            let headers = response.headers();
            if let Some((remaining, reset_at)) = rate_headers(headers) {
                self.quota.observe(remaining, reset_at).await;
            }

            if let Some(reset_at) = exhaustion_reset(status, headers, self.clock.now()) {
                exhaustions += 1;
                if exhaustions > self.quota.config().max_exhaustion_retries {
                    return Err(Error::QuotaRetriesExhausted {
                        attempts: exhaustions,
                    });
                }

                warn!(
                    url = %url,
                    status = status.as_u16(),
                    attempt = exhaustions,
                    "API quota exhausted"
                );
                self.quota.record_exhausted(reset_at).await;
                self.quota.wait_for_reset().await?;
                continue;
            }

            if !status.is_success() {
                debug!(url = %url, status = status.as_u16(), "non-success response");
                return Ok(Reply::Status(status));
            }

            let bytes = response.bytes().await?;
            return parse_body(&bytes).map(Reply::Ok);
        }
    }
}

fn parse_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::Malformed(e.to_string()))
}

// Appends a slash-separated path as individually percent-encoded segments
fn extend_path(url: &mut Url, path: &str) {
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
    }
}

fn header_u64(headers: &HeaderMap, name: impl reqwest::header::AsHeaderName) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

// X-RateLimit-Remaining and X-RateLimit-Reset, when both are present
fn rate_headers(headers: &HeaderMap) -> Option<(u32, SystemTime)> {
    let remaining = header_u64(headers, RATE_REMAINING)?;
    let reset = header_u64(headers, RATE_RESET)?;
    Some((remaining.min(u64::from(u32::MAX)) as u32, from_epoch_secs(reset)))
}

// Decides whether a response means "quota exhausted" and, if so, when the
// quota resets.
//
// - 403/429 with Retry-After: secondary rate limit, wait that many seconds
// - 403/429 with X-RateLimit-Reset and no remaining budget: primary limit
// - anything else (including a plain 403 Forbidden) is not exhaustion
fn exhaustion_reset(status: StatusCode, headers: &HeaderMap, now: SystemTime) -> Option<SystemTime> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    if let Some(secs) = header_u64(headers, RETRY_AFTER) {
        return Some(add_saturating(now, Duration::from_secs(secs)));
    }

    let remaining = header_u64(headers, RATE_REMAINING);
    if matches!(remaining, Some(left) if left > 0) {
        return None;
    }

    header_u64(headers, RATE_RESET).map(from_epoch_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QuotaConfig;
    use crate::quota::testing::ManualClock;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, clock: Arc<ManualClock>) -> GitHubClient {
        let quota = Arc::new(QuotaTracker::new(QuotaConfig::default(), clock.clone()));
        let url = Url::parse(&server.uri()).unwrap();
        let retry = RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        };
        GitHubClient::new(&url, Some("secret"), quota, clock, retry).unwrap()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_exhaustion_detection() {
        let now = from_epoch_secs(1_000);

        let primary = headers(&[(RATE_REMAINING, "0"), (RATE_RESET, "1060")]);
        assert_eq!(
            exhaustion_reset(StatusCode::FORBIDDEN, &primary, now),
            Some(from_epoch_secs(1_060))
        );

        let secondary = headers(&[(RATE_REMAINING, "12"), ("retry-after", "30")]);
        assert_eq!(
            exhaustion_reset(StatusCode::TOO_MANY_REQUESTS, &secondary, now),
            Some(from_epoch_secs(1_030))
        );

        // A permissions 403 still carries the headers, but with budget left
        let forbidden = headers(&[(RATE_REMAINING, "4999"), (RATE_RESET, "1060")]);
        assert_eq!(exhaustion_reset(StatusCode::FORBIDDEN, &forbidden, now), None);

        // Absurd values saturate instead of overflowing
        let huge = headers(&[("retry-after", "18446744073709551615")]);
        let reset = exhaustion_reset(StatusCode::TOO_MANY_REQUESTS, &huge, now).unwrap();
        assert!(reset > now + Duration::from_secs(365 * 24 * 3600));

        assert_eq!(exhaustion_reset(StatusCode::OK, &primary, now), None);
        assert_eq!(
            exhaustion_reset(StatusCode::FORBIDDEN, &HeaderMap::new(), now),
            None
        );
    }

    #[tokio::test]
    async fn test_contents_url_encodes_path_and_sends_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/cat/contents/docs/my%20notes.md"))
            .and(query_param("ref", "main"))
            .and(header("authorization", "token secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": "aGk=\n",
                "encoding": "base64"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(ManualClock::new()));
        let reply = client
            .contents(&RepoId::new("octo", "cat"), "main", "docs/my notes.md")
            .await
            .unwrap();

        match reply {
            Reply::Ok(body) => {
                assert_eq!(body.content, "aGk=\n");
                assert_eq!(body.encoding.as_deref(), Some("base64"));
            }
            Reply::Status(status) => panic!("unexpected status {}", status),
        }
    }

    #[tokio::test]
    async fn test_non_success_is_reported_as_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/cat/git/trees/main"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(ManualClock::new()));
        let reply = client.tree(&RepoId::new("octo", "cat"), "main").await.unwrap();
        assert!(matches!(reply, Reply::Status(StatusCode::NOT_FOUND)));
    }

    #[tokio::test]
    async fn test_exhausted_request_waits_and_retries() {
        let server = MockServer::start().await;
        let clock = Arc::new(ManualClock::at_epoch_secs(10_000));

        Mock::given(method("GET"))
            .and(path("/repos/octo/cat/git/trees/main"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header(RATE_REMAINING, "0")
                    .insert_header(RATE_RESET, "10100"),
            )
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/cat/git/trees/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tree": [{"path": "a.rs", "type": "blob"}],
                "truncated": false
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, clock.clone());
        let reply = client.tree(&RepoId::new("octo", "cat"), "main").await.unwrap();

        match reply {
            Reply::Ok(listing) => assert_eq!(listing.tree.len(), 1),
            Reply::Status(status) => panic!("unexpected status {}", status),
        }
        assert!(clock.epoch_secs() > 10_100);
    }

    #[tokio::test]
    async fn test_repeated_exhaustion_gives_up() {
        let server = MockServer::start().await;
        let clock = Arc::new(ManualClock::at_epoch_secs(10_000));

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
            .mount(&server)
            .await;

        let client = client_for(&server, clock);
        let err = client
            .contents(&RepoId::new("octo", "cat"), "main", "a.rs")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuotaRetriesExhausted { attempts: 4 }));
    }

    #[tokio::test]
    async fn test_unrepresentable_reset_is_unreachable() {
        let server = MockServer::start().await;
        let clock = Arc::new(ManualClock::at_epoch_secs(10_000));

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header(RATE_REMAINING, "0")
                    .insert_header(RATE_RESET, "18446744073709551615"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, clock.clone());
        let err = client
            .contents(&RepoId::new("octo", "cat"), "main", "a.rs")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuotaUnreachable { .. }));
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rate_limit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "rate": {"limit": 60, "remaining": 42, "reset": 1700003600u64}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(ManualClock::new()));
        let status = client.rate_limit().await.unwrap();
        assert_eq!(status.limit, 60);
        assert_eq!(status.remaining, 42);
        assert_eq!(status.reset_at, from_epoch_secs(1_700_003_600));
    }

    #[tokio::test]
    async fn test_each_request_consumes_quota() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server, Arc::new(ManualClock::new()));
        let before = client.quota.check_budget().await.remaining;
        let repo = RepoId::new("octo", "cat");
        client.contents(&repo, "main", "a").await.unwrap();
        client.contents(&repo, "main", "b").await.unwrap();
        let after = client.quota.check_budget().await.remaining;
        assert_eq!(before - after, 2);
    }
}
