// src/aggregate.rs
// =============================================================================
// Builds the single archive file from the fetched results.
//
// Each successfully fetched file becomes one block:
//
//     Path: src/main.rs
//
//     <file contents>
//
//     ---
//
// Blocks are concatenated in the order results arrive. The archive is written
// to `{output_dir}/{repo name}.txt` through a temp file in the same directory
// that is renamed into place, so readers see either the old file or the
// complete new one, never half of it.
// =============================================================================

use crate::error::{Error, Result};
use crate::fetcher::FetchResult;
use crate::github::RepoId;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// The rendered archive, one block per included file
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    blocks: Vec<String>,
}

impl OutputArtifact {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The whole archive as written to disk
    pub fn render(&self) -> String {
        self.blocks.concat()
    }
}

pub fn render_block(path: &str, text: &str) -> String {
    format!("Path: {}\n\n{}\n\n---\n", path, text)
}

/// Keeps successful results only, one block each, in iteration order
pub fn aggregate<I>(results: I) -> OutputArtifact
where
    I: IntoIterator<Item = FetchResult>,
{
    let blocks = results
        .into_iter()
        .filter_map(|result| match result {
            FetchResult::Success { path, text } => Some(render_block(&path, &text)),
            _ => None,
        })
        .collect();

    OutputArtifact { blocks }
}

/// `{dir}/{repo name}.txt`
pub fn output_path(dir: &Path, repo: &RepoId) -> PathBuf {
    dir.join(format!("{}.txt", repo.name))
}

// Writes the archive atomically, creating `dir` if needed.
// Runs on the blocking pool; file I/O must not stall the fetch tasks.
pub async fn write_artifact(dir: &Path, repo: &RepoId, artifact: &OutputArtifact) -> Result<PathBuf> {
    let dir = dir.to_path_buf();
    let target = output_path(&dir, repo);
    let contents = artifact.render();

    let path = target.clone();
    tokio::task::spawn_blocking(move || write_atomic(&dir, &target, contents.as_bytes()))
        .await
        .map_err(|e| Error::Output {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::Other, e),
        })??;

    Ok(path)
}

fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let fail = |source: io::Error| Error::Output {
        path: target.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(fail)?;

    // Same directory as the target, so the rename never crosses filesystems
    let mut temp = NamedTempFile::new_in(dir).map_err(fail)?;
    temp.write_all(bytes).map_err(fail)?;
    temp.as_file().sync_all().map_err(fail)?;

    // Temp files are created owner-only; the archive is an ordinary file
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(fail)?;
    }

    // On failure the temp file is dropped and deleted
    temp.persist(target).map_err(|e| fail(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FailureKind, SkipReason};

    fn results() -> Vec<FetchResult> {
        vec![
            FetchResult::Success {
                path: "a.py".into(),
                text: "print(1)".into(),
            },
            FetchResult::Skipped {
                path: "logo.png".into(),
                reason: SkipReason::NonTextContent,
            },
            FetchResult::Failed {
                path: "gone.py".into(),
                kind: FailureKind::Status(404),
            },
            FetchResult::Success {
                path: "c.py".into(),
                text: "print(3)".into(),
            },
        ]
    }

    #[test]
    fn test_render_block_format() {
        assert_eq!(render_block("a.py", "x"), "Path: a.py\n\nx\n\n---\n");
    }

    #[test]
    fn test_aggregate_keeps_only_successes_in_order() {
        let artifact = aggregate(results());
        assert_eq!(artifact.len(), 2);
        assert_eq!(
            artifact.render(),
            "Path: a.py\n\nprint(1)\n\n---\nPath: c.py\n\nprint(3)\n\n---\n"
        );
        assert!(!artifact.render().contains("logo.png"));
        assert!(!artifact.render().contains("gone.py"));
    }

    #[test]
    fn test_output_path_uses_repo_name() {
        let path = output_path(Path::new("/tmp/out"), &RepoId::new("octo", "cat"));
        assert_eq!(path, PathBuf::from("/tmp/out/cat.txt"));
    }

    #[tokio::test]
    async fn test_write_creates_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("nested").join("out");

        let written = write_artifact(&dir, &RepoId::new("octo", "cat"), &aggregate(results()))
            .await
            .unwrap();

        assert_eq!(written, dir.join("cat.txt"));
        let on_disk = fs::read_to_string(&written).unwrap();
        assert!(on_disk.starts_with("Path: a.py\n"));
        // Only the artifact itself, no leftover temp files
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_written_archive_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let written = write_artifact(temp.path(), &RepoId::new("octo", "cat"), &aggregate(results()))
            .await
            .unwrap();

        let mode = fs::metadata(&written).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[tokio::test]
    async fn test_write_replaces_previous_archive() {
        let temp = tempfile::tempdir().unwrap();
        let repo = RepoId::new("octo", "cat");
        fs::write(temp.path().join("cat.txt"), "stale").unwrap();

        write_artifact(temp.path(), &repo, &OutputArtifact::default())
            .await
            .unwrap();
        assert_eq!(fs::read_to_string(temp.path().join("cat.txt")).unwrap(), "");
    }

    #[tokio::test]
    async fn test_write_failure_is_fatal_and_leaves_nothing() {
        let temp = tempfile::tempdir().unwrap();
        // A regular file where the output directory should be
        let blocker = temp.path().join("out");
        fs::write(&blocker, "not a directory").unwrap();

        let err = write_artifact(&blocker, &RepoId::new("octo", "cat"), &aggregate(results()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Output { .. }));
        assert!(err.is_fatal());
        assert_eq!(fs::read_to_string(&blocker).unwrap(), "not a directory");
    }
}
