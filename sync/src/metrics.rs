//! Metrics and statistics for commit operations

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{info, span, warn, Level};
use uuid::Uuid;

use crate::diff::DeltaStatus;

/// Counters collected over one commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitMetrics {
    /// Unique session identifier
    pub session_id: Uuid,
    pub start_time: SystemTime,
    pub end_time: Option<SystemTime>,
    pub duration: Duration,
    pub files: FileStats,
    /// Uncompressed bytes read from local files
    pub bytes_read: u64,
    /// Time spent inside uploads and removals
    pub transfer_time: Duration,
    /// `path: message` for each failed entry
    pub errors: Vec<String>,
}

/// File-related statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    /// Uploaded as new paths
    pub created: usize,
    /// Uploaded over an existing record
    pub changed: usize,
    pub removed: usize,
    pub failed: usize,
}

impl FileStats {
    pub fn uploaded(&self) -> usize {
        self.created + self.changed
    }

    pub fn processed(&self) -> usize {
        self.created + self.changed + self.removed + self.failed
    }
}

impl Default for CommitMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitMetrics {
    pub fn new() -> Self {
        Self::with_session(Uuid::new_v4())
    }

    /// Metrics tagged with an existing progress session
    pub fn with_session(session_id: Uuid) -> Self {
        Self {
            session_id,
            start_time: SystemTime::now(),
            end_time: None,
            duration: Duration::default(),
            files: FileStats::default(),
            bytes_read: 0,
            transfer_time: Duration::default(),
            errors: Vec::new(),
        }
    }

    /// Mark the commit as completed and log the totals
    pub fn complete(&mut self) {
        let end_time = SystemTime::now();
        self.duration = end_time
            .duration_since(self.start_time)
            .unwrap_or_default();
        self.end_time = Some(end_time);

        info!(
            session_id = %self.session_id,
            duration_secs = self.duration.as_secs_f64(),
            files_created = self.files.created,
            files_changed = self.files.changed,
            files_removed = self.files.removed,
            files_failed = self.files.failed,
            bytes_read = self.bytes_read,
            "Commit completed"
        );
    }

    /// Record one successful upload
    pub fn record_upload(&mut self, status: DeltaStatus, file_size: u64, duration: Duration) {
        let span = span!(
            Level::DEBUG,
            "upload",
            status = ?status,
            file_size = file_size,
            duration_ms = duration.as_millis() as u64
        );
        let _enter = span.enter();

        match status {
            DeltaStatus::Change => self.files.changed += 1,
            _ => self.files.created += 1,
        }
        self.bytes_read += file_size;
        self.transfer_time += duration;
    }

    /// Record one successful removal
    pub fn record_removal(&mut self, duration: Duration) {
        self.files.removed += 1;
        self.transfer_time += duration;
    }

    /// Record one failed entry
    pub fn record_failure(&mut self, path: impl AsRef<str>, message: impl Into<String>) {
        let message = message.into();
        warn!(path = path.as_ref(), message = %message, "Entry failed");

        self.files.failed += 1;
        self.errors.push(format!("{}: {}", path.as_ref(), message));
    }

    pub fn is_successful(&self) -> bool {
        self.files.failed == 0
    }

    /// Upload rate over the whole commit in bytes per second
    pub fn transfer_rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.bytes_read as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        format!(
            "Commit completed in {:.2}s: {} uploaded ({} new, {} changed), {} removed, \
             {} failed, {} bytes read",
            self.duration.as_secs_f64(),
            self.files.uploaded(),
            self.files.created,
            self.files.changed,
            self.files.removed,
            self.files.failed,
            self.bytes_read
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics() {
        let metrics = CommitMetrics::new();
        assert_eq!(metrics.files.processed(), 0);
        assert_eq!(metrics.bytes_read, 0);
        assert!(metrics.is_successful());
    }

    #[test]
    fn test_record_operations() {
        let mut metrics = CommitMetrics::new();

        metrics.record_upload(DeltaStatus::Create, 1024, Duration::from_millis(100));
        metrics.record_upload(DeltaStatus::Change, 10, Duration::from_millis(1));
        metrics.record_removal(Duration::from_millis(1));
        metrics.record_failure("broken.txt", "permission denied");

        assert_eq!(metrics.files.created, 1);
        assert_eq!(metrics.files.changed, 1);
        assert_eq!(metrics.files.removed, 1);
        assert_eq!(metrics.files.processed(), 4);
        assert_eq!(metrics.bytes_read, 1034);
        assert_eq!(metrics.errors, vec!["broken.txt: permission denied"]);
        assert!(!metrics.is_successful());
    }

    #[test]
    fn test_complete_sets_end_time_and_summary() {
        let mut metrics = CommitMetrics::new();
        metrics.record_upload(DeltaStatus::Create, 5, Duration::ZERO);
        metrics.complete();

        assert!(metrics.end_time.is_some());
        assert!(metrics.summary().contains("1 uploaded (1 new, 0 changed)"));
    }

    #[test]
    fn test_json_serialization() {
        let metrics = CommitMetrics::new();
        let json = metrics.to_json().unwrap();
        let deserialized: CommitMetrics = serde_json::from_str(&json).unwrap();
        assert_eq!(metrics.session_id, deserialized.session_id);
    }
}
