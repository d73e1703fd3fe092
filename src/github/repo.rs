// src/github/repo.rs
// =============================================================================
// Repository identifiers.
//
// Users paste all sorts of things on the command line:
//   - rust-lang/rust
//   - https://github.com/rust-lang/rust
//   - https://github.com/rust-lang/rust.git
//   - github.com/rust-lang/rust/tree/master/src
// All of them name the same repository, owner "rust-lang", name "rust".
// =============================================================================

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    // Parses a GitHub URL or a bare owner/name pair
    //
    // Returns: RepoId or Error::InvalidRepo
    //
    // Example:
    //   "https://github.com/rust-lang/rust" -> rust-lang/rust
    pub fn parse(input: &str) -> Result<Self> {
        // Remove common prefixes
        let trimmed = input
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("www.");

        let path = match trimmed.strip_prefix("github.com/") {
            Some(rest) => rest,
            None if trimmed.contains("://") => {
                return Err(Error::InvalidRepo(format!("not a GitHub URL: {}", input)));
            }
            None => trimmed,
        };

        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        if parts.len() < 2 {
            return Err(Error::InvalidRepo(format!(
                "expected owner/name or a GitHub URL: {}",
                input
            )));
        }

        let owner = parts[0];
        // GitHub owners never contain dots; "gitlab.com/user/repo" lands here
        if owner.contains('.') {
            return Err(Error::InvalidRepo(format!("not a GitHub URL: {}", input)));
        }

        let name = parts[1].trim_end_matches(".git");
        if name.is_empty() {
            return Err(Error::InvalidRepo(format!("missing repository name: {}", input)));
        }

        Ok(Self::new(owner, name))
    }

    /// "owner/name"
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
