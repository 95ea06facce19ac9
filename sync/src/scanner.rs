//! Local tree enumeration with ignore-rule pruning, using walkdir

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Result, SyncError};
use crate::filter::IgnoreMatcher;
use crate::path::RepoPath;

/// A regular file found by the local walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Canonical path relative to the scan root
    pub path: RepoPath,
    /// Native path for opening the file
    pub native_path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified time
    pub modified: DateTime<Utc>,
}

/// Walks a local tree, skipping ignored entries.
///
/// An ignored directory is pruned as a whole: none of its descendants are
/// visited.
pub struct DirectoryScanner<'a> {
    root: PathBuf,
    matcher: &'a IgnoreMatcher,
}

impl<'a> DirectoryScanner<'a> {
    pub fn new(root: impl Into<PathBuf>, matcher: &'a IgnoreMatcher) -> Self {
        Self {
            root: root.into(),
            matcher,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily yield every non-ignored regular file, in file-name order per directory.
    ///
    /// A symbolic link to a regular file is yielded with the target's size and
    /// modification time. Links to directories and dangling links are skipped.
    pub fn files(&self) -> impl Iterator<Item = Result<LocalFile>> + '_ {
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| self.keep(entry));

        walker.filter_map(move |entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(self.regular_file(&entry)),
            Ok(entry) if entry.path_is_symlink() => self.linked_file(&entry),
            Ok(_) => None,
            Err(e) => {
                let path = e.path().unwrap_or(&self.root).to_path_buf();
                Some(Err(SyncError::io_error(path, io::Error::from(e))))
            }
        })
    }

    /// Collect [`DirectoryScanner::files`], stopping at the first error
    pub fn scan(&self) -> Result<Vec<LocalFile>> {
        self.files().collect()
    }

    fn relative(&self, path: &Path) -> RepoPath {
        RepoPath::from_native(path.strip_prefix(&self.root).unwrap_or(path))
    }

    fn keep(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let path = self.relative(entry.path());
        !self.matcher.is_ignored(&path, entry.file_type().is_dir())
    }

    fn regular_file(&self, entry: &DirEntry) -> Result<LocalFile> {
        let metadata = entry
            .metadata()
            .map_err(|e| SyncError::io_error(entry.path(), io::Error::from(e)))?;
        self.local_file(entry.path(), &metadata)
    }

    fn linked_file(&self, entry: &DirEntry) -> Option<Result<LocalFile>> {
        match fs::metadata(entry.path()) {
            Ok(metadata) if metadata.is_file() => Some(self.local_file(entry.path(), &metadata)),
            Ok(_) => {
                debug!(path = %entry.path().display(), "skipping link to a directory");
                None
            }
            Err(e) => {
                warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "skipping dangling symbolic link"
                );
                None
            }
        }
    }

    fn local_file(&self, native_path: &Path, metadata: &fs::Metadata) -> Result<LocalFile> {
        let relative = native_path.strip_prefix(&self.root).unwrap_or(native_path);
        if relative.to_str().is_none() {
            return Err(SyncError::validation_error(
                relative.to_string_lossy(),
                "file name is not valid UTF-8 and cannot be used as a remote key",
            ));
        }

        let modified = metadata
            .modified()
            .map_err(|e| SyncError::io_error(native_path, e))?;

        Ok(LocalFile {
            path: self.relative(native_path),
            native_path: native_path.to_path_buf(),
            size: metadata.len(),
            modified: DateTime::<Utc>::from(modified),
        })
    }
}
