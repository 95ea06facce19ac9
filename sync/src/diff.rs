//! Classification of local and remote state into a delta

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::{Result, SyncError};
use crate::filter::IgnoreMatcher;
use crate::hash::hash_file;
use crate::path::RepoPath;
use crate::records::{ContentRecord, RecordStore};
use crate::scanner::{DirectoryScanner, LocalFile};
use crate::transfer::TransferDriver;

/// How a path differs between the local tree and the remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeltaStatus {
    /// Present locally, no remote record
    Create,
    /// Present on both sides with different content
    Change,
    /// Recorded remotely, absent or ignored locally
    Delete,
}

impl DeltaStatus {
    /// Fixed-width label used when listing a delta
    pub fn label(&self) -> &'static str {
        match self {
            DeltaStatus::Create => "ADD   ",
            DeltaStatus::Change => "CHANGE",
            DeltaStatus::Delete => "DELETE",
        }
    }
}

impl fmt::Display for DeltaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Author and time of the version currently on the remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub editor: String,
    pub edited_at: DateTime<Utc>,
}

impl From<&ContentRecord> for Revision {
    fn from(record: &ContentRecord) -> Self {
        Self {
            editor: record.last_editor.clone(),
            edited_at: record.last_edit,
        }
    }
}

/// One classified difference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaEntry {
    pub path: RepoPath,
    pub status: DeltaStatus,
    /// Remote version being replaced or removed; `None` for creates
    pub previous: Option<Revision>,
}

impl DeltaEntry {
    pub fn create(path: RepoPath) -> Self {
        Self {
            path,
            status: DeltaStatus::Create,
            previous: None,
        }
    }

    pub fn change(path: RepoPath, record: &ContentRecord) -> Self {
        Self {
            path,
            status: DeltaStatus::Change,
            previous: Some(record.into()),
        }
    }

    pub fn delete(path: RepoPath, record: &ContentRecord) -> Self {
        Self {
            path,
            status: DeltaStatus::Delete,
            previous: Some(record.into()),
        }
    }

    /// Whether applying this entry uploads local content
    pub fn is_upload(&self) -> bool {
        matches!(self.status, DeltaStatus::Create | DeltaStatus::Change)
    }
}

impl fmt::Display for DeltaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.path)?;
        if let Some(previous) = &self.previous {
            write!(
                f,
                " previously changed at {} by {}",
                previous.edited_at.format("%a %b %e %H:%M:%S UTC %Y"),
                previous.editor
            )?;
        }
        Ok(())
    }
}

/// Counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaSummary {
    pub creates: usize,
    pub changes: usize,
    pub deletes: usize,
}

impl DeltaSummary {
    fn from_entries(entries: &[DeltaEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            match entry.status {
                DeltaStatus::Create => summary.creates += 1,
                DeltaStatus::Change => summary.changes += 1,
                DeltaStatus::Delete => summary.deletes += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.creates + self.changes + self.deletes
    }
}

/// Ordered differences found by one reconciliation pass.
///
/// Local-walk entries come first in walk order, then remote-only deletes in
/// remote-walk order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    entries: Vec<DeltaEntry>,
    summary: DeltaSummary,
}

impl Delta {
    pub fn new(entries: Vec<DeltaEntry>) -> Self {
        let summary = DeltaSummary::from_entries(&entries);
        Self { entries, summary }
    }

    pub fn entries(&self) -> &[DeltaEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<DeltaEntry> {
        self.entries
    }

    pub fn summary(&self) -> DeltaSummary {
        self.summary
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DeltaEntry> {
        self.entries.iter()
    }

    /// Entries whose status passes `filter`, order preserved
    pub fn filter(&self, filter: &StatusFilter) -> Delta {
        Delta::new(
            self.entries
                .iter()
                .filter(|entry| filter.matches(entry.status))
                .cloned()
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Delta {
    type Item = &'a DeltaEntry;
    type IntoIter = std::slice::Iter<'a, DeltaEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Filter for selecting which statuses to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFilter {
    pub include_creates: bool,
    pub include_changes: bool,
    pub include_deletes: bool,
}

impl Default for StatusFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl StatusFilter {
    /// Keep every entry
    pub fn all() -> Self {
        Self {
            include_creates: true,
            include_changes: true,
            include_deletes: true,
        }
    }

    /// Keep creates and changes, drop deletes
    pub fn uploads_only() -> Self {
        Self {
            include_creates: true,
            include_changes: true,
            include_deletes: false,
        }
    }

    pub fn matches(&self, status: DeltaStatus) -> bool {
        match status {
            DeltaStatus::Create => self.include_creates,
            DeltaStatus::Change => self.include_changes,
            DeltaStatus::Delete => self.include_deletes,
        }
    }
}

/// Compares the local tree against remote records
pub struct Reconciler<'a> {
    local_root: PathBuf,
    matcher: &'a IgnoreMatcher,
    records: &'a RecordStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        local_root: impl Into<PathBuf>,
        matcher: &'a IgnoreMatcher,
        records: &'a RecordStore,
    ) -> Self {
        Self {
            local_root: local_root.into(),
            matcher,
            records,
        }
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    fn scanner(&self) -> DirectoryScanner<'a> {
        DirectoryScanner::new(self.local_root.clone(), self.matcher)
    }

    /// Upload every non-ignored local file without comparing anything.
    ///
    /// Used against an empty remote. The first failure aborts the walk.
    #[instrument(skip_all, fields(root = %self.local_root.display()))]
    pub fn full_push(&self, driver: &TransferDriver<'_>) -> Result<Vec<RepoPath>> {
        let mut pushed = Vec::new();

        for file in self.scanner().files() {
            let file = file?;
            driver.upload(&file)?;
            pushed.push(file.path);
        }

        info!(files = pushed.len(), "full push complete");
        Ok(pushed)
    }

    /// Classify every local file and every remote record.
    #[instrument(skip_all, fields(root = %self.local_root.display()))]
    pub fn compute_delta(&self) -> Result<Delta> {
        let mut entries = Vec::new();
        let mut seen: HashSet<RepoPath> = HashSet::new();

        for file in self.scanner().files() {
            let file = file?;
            seen.insert(file.path.clone());

            let classified = self
                .classify(&file)
                .map_err(|e| SyncError::entry_error(file.path.as_str(), e))?;
            if let Some(entry) = classified {
                debug!(path = %entry.path, status = ?entry.status, "classified");
                entries.push(entry);
            }
        }

        // `seen` must be complete before the remote pass starts
        for listed in self.records.list_records(Some(self.matcher)) {
            let (path, record) = listed?;
            if !seen.contains(&path) {
                debug!(path = %path, "remote only");
                entries.push(DeltaEntry::delete(path, &record));
            }
        }

        let delta = Delta::new(entries);
        let summary = delta.summary();
        info!(
            creates = summary.creates,
            changes = summary.changes,
            deletes = summary.deletes,
            "delta computed"
        );
        Ok(delta)
    }

    /// Every non-ignored local file as a create; what a push to an empty
    /// remote would upload
    pub fn local_creates(&self) -> Result<Delta> {
        let entries = self
            .scanner()
            .files()
            .map(|file| file.map(|f| DeltaEntry::create(f.path)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Delta::new(entries))
    }

    fn classify(&self, file: &LocalFile) -> Result<Option<DeltaEntry>> {
        if !self.records.exists(&file.path)? {
            return Ok(Some(DeltaEntry::create(file.path.clone())));
        }

        let record = self.records.read_record(&file.path)?;
        let local_hash = hash_file(&file.native_path)?;
        if local_hash == record.hash {
            return Ok(None);
        }
        Ok(Some(DeltaEntry::change(file.path.clone(), &record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(editor: &str) -> ContentRecord {
        ContentRecord {
            hash: crate::hash::ContentHash::of(b"x"),
            last_editor: editor.to_string(),
            last_edit: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn test_summary_counts() {
        let delta = Delta::new(vec![
            DeltaEntry::create(RepoPath::new("a")),
            DeltaEntry::create(RepoPath::new("b")),
            DeltaEntry::change(RepoPath::new("c"), &record("u")),
            DeltaEntry::delete(RepoPath::new("d"), &record("u")),
        ]);
        assert_eq!(
            delta.summary(),
            DeltaSummary {
                creates: 2,
                changes: 1,
                deletes: 1
            }
        );
        assert_eq!(delta.summary().total(), 4);
    }

    #[test]
    fn test_filter_keeps_order() {
        let delta = Delta::new(vec![
            DeltaEntry::delete(RepoPath::new("z"), &record("u")),
            DeltaEntry::create(RepoPath::new("b")),
            DeltaEntry::change(RepoPath::new("a"), &record("u")),
        ]);
        let uploads = delta.filter(&StatusFilter::uploads_only());
        let paths: Vec<_> = uploads.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["b", "a"]);
        assert_eq!(uploads.summary().deletes, 0);
    }

    #[test]
    fn test_display_mentions_previous_editor() {
        let entry = DeltaEntry::change(RepoPath::new("docs/a.md"), &record("alice"));
        let line = entry.to_string();
        assert!(line.starts_with("CHANGE docs/a.md previously changed at"));
        assert!(line.ends_with("by alice"));

        let entry = DeltaEntry::create(RepoPath::new("new.txt"));
        assert_eq!(entry.to_string(), "ADD    new.txt");
    }
}
