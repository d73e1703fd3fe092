// src/lister.rs
// =============================================================================
// Turns a repository into the list of file paths worth fetching.
//
// How it works:
// 1. Ask GitHub for the recursive tree of the configured branch
// 2. Keep only "blob" entries (regular files; directories are "tree",
//    submodules are "commit")
// 3. Drop every path that contains an exclusion substring
//
// A failed listing (404 for a missing branch, 403 for a private repo, ...)
// is NOT an error: the repository simply looks empty. Only an unreachable
// API or an unreachable quota stops the run.
// =============================================================================

use crate::context::Context;
use crate::error::{Error, Result};
use crate::exclusions::ExclusionSet;
use crate::github::{Reply, RepoId, TreeEntry};
use crate::memo::RequestKey;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

// Lists fetchable files of `repo`, sorted, without duplicates.
// Repeated calls with the same repo and exclusion set reuse the first
// listing instead of asking GitHub again.
pub async fn list_files(
    ctx: &Context,
    repo: &RepoId,
    exclusions: &ExclusionSet,
) -> Result<Arc<Vec<String>>> {
    let key = RequestKey::tree(repo, &ctx.branch, exclusions);
    ctx.trees
        .memoize(key, || fetch_listing(ctx, repo, exclusions))
        .await
}

async fn fetch_listing(
    ctx: &Context,
    repo: &RepoId,
    exclusions: &ExclusionSet,
) -> Result<Arc<Vec<String>>> {
    let reply = match ctx.client.tree(repo, &ctx.branch).await {
        Ok(reply) => reply,
        Err(Error::Network(source)) => {
            return Err(Error::ListingUnreachable {
                repo: repo.to_string(),
                source,
            });
        }
        Err(Error::Malformed(message)) => {
            warn!(repo = %repo, %message, "unreadable tree listing, treating repository as empty");
            return Ok(Arc::new(Vec::new()));
        }
        Err(e) => return Err(e),
    };

    let listing = match reply {
        Reply::Ok(listing) => listing,
        Reply::Status(status) => {
            warn!(
                repo = %repo,
                branch = %ctx.branch,
                status = status.as_u16(),
                "tree listing failed, treating repository as empty"
            );
            return Ok(Arc::new(Vec::new()));
        }
    };

    if listing.truncated {
        warn!(repo = %repo, "GitHub truncated the tree listing; some files will be missing");
    }

    let total = listing.tree.len();
    let files = filter_tree(listing.tree, exclusions);
    info!(
        repo = %repo,
        entries = total,
        files = files.len(),
        "listed repository tree"
    );

    Ok(Arc::new(files))
}

/// Regular files whose path contains no exclusion member, sorted and unique
pub fn filter_tree<I>(entries: I, exclusions: &ExclusionSet) -> Vec<String>
where
    I: IntoIterator<Item = TreeEntry>,
{
    entries
        .into_iter()
        .filter(|entry| entry.kind == "blob")
        .filter(|entry| !exclusions.excludes(&entry.path))
        .map(|entry| entry.path)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::context_for;
    use crate::quota::testing::ManualClock;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(path: &str, kind: &str) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            kind: kind.to_string(),
        }
    }

    #[test]
    fn test_filter_keeps_only_blobs() {
        let entries = vec![
            entry("src", "tree"),
            entry("src/main.rs", "blob"),
            entry("vendor/lib", "commit"),
            entry("README.md", "blob"),
        ];
        let files = filter_tree(entries, &ExclusionSet::default());
        assert_eq!(files, vec!["README.md", "src/main.rs"]);
    }

    #[test]
    fn test_filter_output_is_subset_without_excluded_paths() {
        let paths = [
            "a.py",
            "b.bin",
            "c.py",
            "bin/tool",
            "docs/logo.png",
            "node_modules/x/index.js",
            "src/binary_search.rs",
        ];
        let exclusions = ExclusionSet::new(["bin", ".png", "node_modules"]);
        let files = filter_tree(paths.iter().map(|p| entry(p, "blob")), &exclusions);

        for file in &files {
            assert!(paths.contains(&file.as_str()));
            assert!(exclusions.iter().all(|pattern| !file.contains(pattern)));
        }
        assert_eq!(files, vec!["a.py", "c.py"]);
    }

    #[test]
    fn test_filter_removes_duplicates() {
        let entries = vec![entry("a.rs", "blob"), entry("a.rs", "blob")];
        assert_eq!(filter_tree(entries, &ExclusionSet::default()), vec!["a.rs"]);
    }

    #[tokio::test]
    async fn test_list_files_applies_exclusions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/cat/git/trees/main"))
            .and(query_param("recursive", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tree": [
                    {"path": "a.py", "type": "blob"},
                    {"path": "b.bin", "type": "blob"},
                    {"path": "c.py", "type": "blob"},
                    {"path": "pkg", "type": "tree"}
                ],
                "truncated": false
            })))
            .mount(&server)
            .await;

        let ctx = context_for(&server, Arc::new(ManualClock::new()));
        let files = list_files(&ctx, &RepoId::new("octo", "cat"), &ExclusionSet::new(["bin"]))
            .await
            .unwrap();
        assert_eq!(*files, vec!["a.py", "c.py"]);
    }

    #[tokio::test]
    async fn test_failed_listing_degrades_to_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/cat/git/trees/main"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ctx = context_for(&server, Arc::new(ManualClock::new()));
        let files = list_files(&ctx, &RepoId::new("octo", "cat"), &ExclusionSet::default())
            .await
            .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_identical_listings_hit_the_network_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/cat/git/trees/main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tree": [{"path": "a.py", "type": "blob"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context_for(&server, Arc::new(ManualClock::new()));
        let repo = RepoId::new("octo", "cat");
        let xy = ExclusionSet::new(["x", "y"]);
        let yx = ExclusionSet::new(["y", "x"]);
        let first = list_files(&ctx, &repo, &xy);
        let second = list_files(&ctx, &repo, &yx);
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap(), second.unwrap());
        // MockServer verifies .expect(1) on drop
    }
}
