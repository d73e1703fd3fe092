// src/context.rs
// =============================================================================
// Everything one run shares between its concurrent fetches: the API client,
// the quota tracker, and the two request caches. Built once per run and
// passed by reference; there is no global state.
// =============================================================================

use crate::config::RunConfig;
use crate::error::Result;
use crate::fetcher::FetchResult;
use crate::github::GitHubClient;
use crate::memo::{Memoizer, RequestKey};
use crate::quota::{Clock, QuotaTracker};
use std::sync::Arc;

pub struct Context {
    pub client: GitHubClient,
    pub quota: Arc<QuotaTracker>,
    /// Branch every listing and content request targets
    pub branch: String,
    pub trees: Memoizer<RequestKey, Arc<Vec<String>>>,
    pub contents: Memoizer<RequestKey, FetchResult>,
}

impl Context {
    pub fn new(config: &RunConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let quota = Arc::new(QuotaTracker::new(config.quota.clone(), clock.clone()));
        let client = GitHubClient::new(
            &config.api_url,
            config.token.as_deref(),
            quota.clone(),
            clock,
            config.retry.clone(),
        )?;

        Ok(Self {
            client,
            quota,
            branch: config.branch.clone(),
            trees: Memoizer::new(),
            contents: Memoizer::new(),
        })
    }
}
