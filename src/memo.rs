// src/memo.rs
// =============================================================================
// Per-run request memoization.
//
// Every request key maps to a tokio OnceCell. The first caller for a key runs
// the producer; anyone who arrives while it is still running awaits the same
// cell instead of starting a second request, and later callers get the stored
// value. So there is at most one underlying call per key, even under
// concurrency, not just "cache after the fact".
//
// The cache lives exactly as long as the Memoizer value; nothing is persisted.
// =============================================================================

use crate::exclusions::ExclusionSet;
use crate::github::RepoId;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Canonical identity of an API request: operation kind plus arguments.
/// Set-valued arguments are already canonical (ExclusionSet is ordered).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestKey {
    Tree {
        repo: RepoId,
        branch: String,
        exclusions: ExclusionSet,
    },
    Content {
        repo: RepoId,
        branch: String,
        path: String,
    },
}

impl RequestKey {
    pub fn tree(repo: &RepoId, branch: &str, exclusions: &ExclusionSet) -> Self {
        RequestKey::Tree {
            repo: repo.clone(),
            branch: branch.to_string(),
            exclusions: exclusions.clone(),
        }
    }

    pub fn content(repo: &RepoId, branch: &str, path: &str) -> Self {
        RequestKey::Content {
            repo: repo.clone(),
            branch: branch.to_string(),
            path: path.to_string(),
        }
    }
}

pub struct Memoizer<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> Default for Memoizer<K, V> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> Memoizer<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    // The map lock is only held long enough to find or create the cell
    async fn cell(&self, key: K) -> Arc<OnceCell<V>> {
        let mut cells = self.cells.lock().await;
        cells.entry(key).or_default().clone()
    }

    /// Returns the value for `key`, running `producer` only if no earlier or
    /// in-flight call for the same key exists.
    ///
    /// Errors are handed back to the caller and not stored; the next caller
    /// for the key runs the producer again.
    pub async fn memoize<F, Fut, E>(&self, key: K, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell(key).await;
        cell.get_or_try_init(producer).await.cloned()
    }

    /// Number of distinct keys seen this run
    pub async fn len(&self) -> usize {
        self.cells.lock().await.len()
    }
}
