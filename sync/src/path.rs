//! Canonical path handling shared by the local walk, the remote keys and ignore matching
//!
//! A [`RepoPath`] stores one representation only: forward-slash separated,
//! no `.` segments, no duplicate or trailing slashes. Native paths are
//! converted at the filesystem boundary and segments are derived on demand.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Canonical, forward-slash path used as remote key and for ignore matching
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoPath {
    inner: String,
}

impl RepoPath {
    /// Build from a canonical (or nearly canonical) string.
    ///
    /// Backslashes are not touched: on the canonical side they are ordinary
    /// file name characters.
    pub fn new(canonical: impl AsRef<str>) -> Self {
        let raw = canonical.as_ref();
        let absolute = raw.starts_with('/');
        let joined = raw
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect::<Vec<_>>()
            .join("/");

        let inner = if absolute {
            format!("/{}", joined)
        } else {
            joined
        };
        Self { inner }
    }

    /// Convert a native path into canonical form.
    ///
    /// A drive prefix (`C:`) is encoded as a leading `/c` segment so that it
    /// survives the trip to forward slashes.
    pub fn from_native(path: impl AsRef<Path>) -> Self {
        let mut absolute = false;
        let mut segments: Vec<String> = Vec::new();

        for component in path.as_ref().components() {
            match component {
                Component::Prefix(prefix) => {
                    absolute = true;
                    let raw = prefix.as_os_str().to_string_lossy();
                    let drive = raw.trim_end_matches(':').to_lowercase();
                    segments.push(drive);
                }
                Component::RootDir => absolute = true,
                Component::CurDir => {}
                Component::ParentDir => segments.push("..".to_string()),
                Component::Normal(name) => segments.push(name.to_string_lossy().into_owned()),
            }
        }

        let joined = segments.join("/");
        let inner = if absolute {
            format!("/{}", joined)
        } else {
            joined
        };
        Self { inner }
    }

    /// Build from ordered path components
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parts: Vec<String> = segments
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();
        Self::new(parts.join("/"))
    }

    /// Canonical string form
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Ordered path components, the form used for pattern matching
    pub fn segments(&self) -> Vec<&str> {
        self.inner.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Convert back to a platform-native path for local I/O
    pub fn to_native(&self) -> PathBuf {
        native_from_segments(self.inner.starts_with('/'), &self.segments())
    }

    /// Resolve this (relative) path against a local root directory
    pub fn to_native_under(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for segment in self.segments() {
            path.push(segment);
        }
        path
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_absolute(&self) -> bool {
        self.inner.starts_with('/')
    }

    /// Last component
    pub fn file_name(&self) -> Option<&str> {
        self.segments().last().copied()
    }

    /// Parent directory, `None` for a single-segment path
    pub fn parent(&self) -> Option<Self> {
        let segments = self.segments();
        if segments.len() <= 1 {
            return None;
        }
        let parent = Self::from_segments(&segments[..segments.len() - 1]);
        if self.is_absolute() {
            Some(Self::new(format!("/{}", parent.inner)))
        } else {
            Some(parent)
        }
    }

    /// Append a relative path
    pub fn join(&self, other: impl AsRef<str>) -> Self {
        if self.inner.is_empty() {
            return Self::new(other);
        }
        Self::new(format!("{}/{}", self.inner, other.as_ref()))
    }

    /// Path relative to `parent`, compared segment by segment
    pub fn relative_to(&self, parent: &RepoPath) -> Result<Self> {
        if self.is_absolute() != parent.is_absolute() && !parent.is_empty() {
            return Err(not_inside(self, parent));
        }

        let own = self.segments();
        let base = parent.segments();
        if base.len() > own.len() || own[..base.len()] != base[..] {
            return Err(not_inside(self, parent));
        }
        Ok(Self::from_segments(&own[base.len()..]))
    }

    /// Append a suffix to the last component (`a/b.txt` + `.gz`)
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            inner: format!("{}{}", self.inner, suffix),
        }
    }
}

fn not_inside(path: &RepoPath, parent: &RepoPath) -> SyncError {
    SyncError::validation_error(
        path.as_str(),
        format!("path is not inside '{}'", parent.as_str()),
    )
}

#[cfg(windows)]
fn native_from_segments(absolute: bool, segments: &[&str]) -> PathBuf {
    let mut path = PathBuf::new();
    let mut rest = segments;

    if absolute {
        match segments.first() {
            Some(drive) if drive.len() == 1 && drive.chars().all(|c| c.is_ascii_alphabetic()) => {
                path.push(format!("{}:\\", drive.to_uppercase()));
                rest = &segments[1..];
            }
            _ => path.push("\\"),
        }
    }

    for segment in rest {
        path.push(segment);
    }
    path
}

#[cfg(not(windows))]
fn native_from_segments(absolute: bool, segments: &[&str]) -> PathBuf {
    let mut path = if absolute {
        PathBuf::from("/")
    } else {
        PathBuf::new()
    };
    for segment in segments {
        path.push(segment);
    }
    path
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

impl AsRef<str> for RepoPath {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl From<&str> for RepoPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("a/b/c.txt", "a/b/c.txt" ; "already canonical")]
    #[test_case("./a//b/", "a/b" ; "dot and duplicate slashes")]
    #[test_case("/srv/data/", "/srv/data" ; "absolute trailing slash")]
    #[test_case("", "" ; "empty")]
    fn test_new_normalizes(input: &str, expected: &str) {
        assert_eq!(RepoPath::new(input).as_str(), expected);
    }

    #[test]
    fn test_from_native_relative() {
        let native: PathBuf = ["dir", "sub", "file.txt"].iter().collect();
        assert_eq!(RepoPath::from_native(&native).as_str(), "dir/sub/file.txt");
    }

    #[test]
    fn test_from_native_skips_current_dir() {
        let native = Path::new(".").join("a.txt");
        assert_eq!(RepoPath::from_native(native).as_str(), "a.txt");
    }

    #[cfg(windows)]
    #[test]
    fn test_drive_letter_becomes_leading_segment() {
        let path = RepoPath::from_native(r"C:\Users\me\file.txt");
        assert_eq!(path.as_str(), "/c/Users/me/file.txt");
        assert_eq!(path.to_native(), PathBuf::from(r"C:\Users\me\file.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_backslash_is_a_name_character_on_unix() {
        let path = RepoPath::from_native(r"odd\name.txt");
        assert_eq!(path.segments(), vec![r"odd\name.txt"]);
    }

    #[test]
    fn test_segments_and_back() {
        let path = RepoPath::new("a/b/c");
        assert_eq!(path.segments(), vec!["a", "b", "c"]);
        assert_eq!(RepoPath::from_segments(path.segments()), path);
    }

    #[test]
    fn test_relative_to() {
        let path = RepoPath::new("/root/meta/a/b.txt");
        let base = RepoPath::new("/root/meta");
        assert_eq!(path.relative_to(&base).unwrap().as_str(), "a/b.txt");
    }

    #[test]
    fn test_relative_to_is_segment_aware() {
        let path = RepoPath::new("/root/metadata/a.txt");
        let base = RepoPath::new("/root/meta");
        assert!(path.relative_to(&base).is_err());
    }

    #[test]
    fn test_parent_and_file_name() {
        let path = RepoPath::new("a/b/c.txt");
        assert_eq!(path.file_name(), Some("c.txt"));
        assert_eq!(path.parent().unwrap().as_str(), "a/b");
        assert_eq!(RepoPath::new("c.txt").parent(), None);
        assert_eq!(RepoPath::new("/r/c.txt").parent().unwrap().as_str(), "/r");
    }

    #[test]
    fn test_join_and_suffix() {
        let root = RepoPath::new("/srv/project");
        let content = root.join("content").join("a/b.txt").with_suffix(".gz");
        assert_eq!(content.as_str(), "/srv/project/content/a/b.txt.gz");
        assert_eq!(RepoPath::new("").join("x").as_str(), "x");
    }

    #[test]
    fn test_distinct_native_forms_share_one_key() {
        let a = RepoPath::from_native(Path::new("./docs/readme.md"));
        let b = RepoPath::from_native(Path::new("docs").join("readme.md"));
        assert_eq!(a, b);
    }
}
