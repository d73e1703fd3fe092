// src/github/mod.rs
// =============================================================================
// This module talks to the GitHub REST API.
//
// Currently implements:
// - Parsing repository URLs / owner/name pairs (repo.rs)
// - The quota-aware HTTP client for the tree, contents and rate_limit
//   endpoints (client.rs)
// =============================================================================

mod client;
mod repo;

pub use client::{GitHubClient, Reply, TreeEntry};
pub use repo::RepoId;
