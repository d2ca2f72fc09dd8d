//! The single scratch directory a request downloads into.
//!
//! One request may use a workspace at a time. Reset, listing and reading are
//! not atomic with respect to each other, so concurrent callers need one
//! directory each.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the directory when missing and deletes everything inside it.
    ///
    /// Best effort: entries that cannot be removed are logged and left behind.
    pub fn reset(&self) -> ResetSummary {
        let mut summary = ResetSummary::default();
        if let Err(err) = fs::create_dir_all(&self.root) {
            warn!(dir = %self.root.display(), "could not create workspace: {err}");
            return summary;
        }

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %self.root.display(), "could not list workspace: {err}");
                return summary;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let result = match entry.file_type() {
                Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path),
                _ => fs::remove_file(&path),
            };
            match result {
                Ok(()) => summary.removed += 1,
                Err(err) => {
                    warn!(path = %path.display(), "could not remove stale entry: {err}");
                    summary.failed += 1;
                }
            }
        }

        debug!(
            dir = %self.root.display(),
            removed = summary.removed,
            failed = summary.failed,
            "workspace reset"
        );
        summary
    }

    /// Regular files in the workspace, sorted by file name.
    pub fn files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
            .map(|entry| entry.path())
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        files
    }

    /// First file, in name order, accepted by `predicate`. `None` when nothing
    /// matches or the directory is unreadable.
    pub fn find_artifact(&self, predicate: impl Fn(&Path) -> bool) -> Option<PathBuf> {
        self.files().into_iter().find(|path| predicate(path))
    }
}

/// True when the file name ends in `.{ext}` (ASCII case-insensitive).
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .is_some_and(|value| value.eq_ignore_ascii_case(ext))
}
