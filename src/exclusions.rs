// src/exclusions.rs
// =============================================================================
// Path exclusion rules.
//
// An exclusion list is a plain text file, one substring per line:
//
//     node_modules
//     .png
//     package-lock.json
//
// A path is dropped when ANY entry appears anywhere inside it. The list is
// loaded once at startup; --select narrows it to chosen entries (1-based,
// the same numbering --show-exclusions prints).
//
// The set is ordered (BTreeSet), so two sets with the same members always
// compare and hash equal regardless of the order they were written in.
// =============================================================================

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ExclusionSet(BTreeSet<String>);

impl ExclusionSet {
    // Blank entries are dropped: "" is a substring of every path
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            patterns
                .into_iter()
                .map(Into::into)
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        )
    }

    /// True if any member occurs inside `path`
    pub fn excludes(&self, path: &str) -> bool {
        self.0.iter().any(|pattern| path.contains(pattern.as_str()))
    }

    pub fn extend<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.extend(Self::new(patterns).0);
    }

    /// Members in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// Reads the exclusion list file, keeping file order so --select indices
// line up with what --show-exclusions printed.
//
// A missing file is an error only when the user named it explicitly;
// the default exclusion_list.txt is optional.
pub fn load_list(path: &Path, explicit: bool) -> Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(parse_list(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
            tracing::debug!(path = %path.display(), "no exclusion list, excluding nothing");
            Ok(Vec::new())
        }
        Err(source) => Err(Error::ExclusionFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parse_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

// Picks entries by 1-based index. An empty selection means "all of them".
pub fn select(list: &[String], indices: &[usize]) -> Result<ExclusionSet> {
    if indices.is_empty() {
        return Ok(ExclusionSet::new(list.iter().cloned()));
    }

    let mut chosen = Vec::with_capacity(indices.len());
    for &index in indices {
        let entry = index
            .checked_sub(1)
            .and_then(|i| list.get(i))
            .ok_or(Error::InvalidSelection {
                index,
                len: list.len(),
            })?;
        chosen.push(entry.clone());
    }
    Ok(ExclusionSet::new(chosen))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_exclusion() {
        let set = ExclusionSet::new(["bin", "node_modules"]);
        assert!(set.excludes("b.bin"));
        assert!(set.excludes("web/node_modules/x.js"));
        assert!(set.excludes("bin/tool"));
        assert!(!set.excludes("src/main.rs"));
    }

    #[test]
    fn test_blank_entries_never_exclude_everything() {
        let set = ExclusionSet::new(["", "   ", ".png"]);
        assert_eq!(set.len(), 1);
        assert!(!set.excludes("README.md"));
    }

    #[test]
    fn test_order_independent_equality() {
        let a = ExclusionSet::new(["b", "a", "c"]);
        let b = ExclusionSet::new(["c", "b", "a", "a"]);
        assert_eq!(a, b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_list_trims_and_skips_blanks() {
        let list = parse_list("node_modules\n\n  .png  \r\nLICENSE\n");
        assert_eq!(list, vec!["node_modules", ".png", "LICENSE"]);
    }

    #[test]
    fn test_select_by_index() {
        let list = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let set = select(&list, &[1, 3]).unwrap();
        assert_eq!(set, ExclusionSet::new(["a", "c"]));

        let all = select(&list, &[]).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_select_out_of_range() {
        let list = vec!["a".to_string()];
        assert!(matches!(
            select(&list, &[0]),
            Err(Error::InvalidSelection { index: 0, len: 1 })
        ));
        assert!(matches!(
            select(&list, &[2]),
            Err(Error::InvalidSelection { index: 2, len: 1 })
        ));
    }

    #[test]
    fn test_missing_default_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exclusion_list.txt");
        assert!(load_list(&path, false).unwrap().is_empty());
        assert!(matches!(
            load_list(&path, true),
            Err(Error::ExclusionFile { .. })
        ));
    }

    #[test]
    fn test_load_list_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exclusions.txt");
        std::fs::write(&path, ".lock\ndist/\n").unwrap();
        assert_eq!(load_list(&path, true).unwrap(), vec![".lock", "dist/"]);
    }
}
