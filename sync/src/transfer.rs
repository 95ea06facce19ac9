//! Applies delta entries to the remote store

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::diff::{DeltaEntry, DeltaStatus};
use crate::error::{Result, SyncError};
use crate::metrics::CommitMetrics;
use crate::progress::ProgressReporter;
use crate::records::{ContentRecord, RecordStore};
use crate::scanner::LocalFile;

/// Outcome of applying a batch of entries
#[derive(Debug, Default)]
pub struct TransferReport {
    /// Entries applied, in application order
    pub applied: Vec<DeltaEntry>,
    /// Entries that failed, with the error that stopped each one
    pub failed: Vec<(DeltaEntry, SyncError)>,
}

impl TransferReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Uploads and removes records on behalf of one editor
pub struct TransferDriver<'a> {
    records: &'a RecordStore,
    local_root: PathBuf,
    editor: String,
    progress: Option<ProgressReporter>,
    metrics: Mutex<CommitMetrics>,
}

impl<'a> TransferDriver<'a> {
    pub fn new(
        records: &'a RecordStore,
        local_root: impl Into<PathBuf>,
        editor: impl Into<String>,
    ) -> Self {
        Self {
            records,
            local_root: local_root.into(),
            editor: editor.into(),
            progress: None,
            metrics: Mutex::new(CommitMetrics::new()),
        }
    }

    /// Report every upload and removal on `reporter`
    pub fn with_progress(mut self, reporter: ProgressReporter) -> Self {
        self.metrics = Mutex::new(CommitMetrics::with_session(reporter.session_id()));
        self.progress = Some(reporter);
        self
    }

    pub fn editor(&self) -> &str {
        &self.editor
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// Stream one local file to the remote as a new version
    pub fn upload(&self, file: &LocalFile) -> Result<ContentRecord> {
        self.upload_as(file, DeltaStatus::Create)
    }

    #[instrument(skip_all, fields(path = %file.path))]
    fn upload_as(&self, file: &LocalFile, status: DeltaStatus) -> Result<ContentRecord> {
        let started = Instant::now();

        let record = File::open(&file.native_path)
            .map_err(|e| SyncError::io_error(&file.native_path, e))
            .and_then(|source| {
                self.records.write_record(
                    &file.path,
                    BufReader::new(source),
                    &self.editor,
                    file.modified,
                )
            })
            .map_err(|e| SyncError::entry_error(file.path.as_str(), e))?;

        let elapsed = started.elapsed();
        debug!(bytes = file.size, "uploaded");
        self.metrics.lock().record_upload(status, file.size, elapsed);
        if let Some(progress) = &self.progress {
            progress.uploaded(file.path.as_str(), status, file.size, elapsed);
        }
        Ok(record)
    }

    /// Apply a single entry. Errors carry the entry's path.
    pub fn apply(&self, entry: &DeltaEntry) -> Result<()> {
        match entry.status {
            DeltaStatus::Create | DeltaStatus::Change => {
                let file = self
                    .local_file(entry)
                    .map_err(|e| SyncError::entry_error(entry.path.as_str(), e))?;
                self.upload_as(&file, entry.status)?;
            }
            DeltaStatus::Delete => {
                let started = Instant::now();
                self.records
                    .remove_record(&entry.path)
                    .map_err(|e| SyncError::entry_error(entry.path.as_str(), e))?;

                self.metrics.lock().record_removal(started.elapsed());
                if let Some(progress) = &self.progress {
                    progress.removed(entry.path.as_str());
                }
            }
        }
        Ok(())
    }

    /// Apply `entries` in order.
    ///
    /// With `continue_on_error` every entry is attempted and failures are
    /// collected in the report; otherwise the first failure is returned.
    pub fn apply_all(
        &self,
        entries: &[DeltaEntry],
        continue_on_error: bool,
    ) -> Result<TransferReport> {
        let mut report = TransferReport::default();

        for entry in entries {
            match self.apply(entry) {
                Ok(()) => report.applied.push(entry.clone()),
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "failed to apply entry");
                    self.record_failure(entry.path.as_str(), &e);
                    if !continue_on_error {
                        return Err(e);
                    }
                    report.failed.push((entry.clone(), e));
                }
            }
        }

        Ok(report)
    }

    /// Count a failure that happened outside [`TransferDriver::apply_all`]
    pub fn record_failure(&self, path: &str, error: &SyncError) {
        self.metrics.lock().record_failure(path, error.to_string());
        if let Some(progress) = &self.progress {
            progress.entry_failed(path, error.to_string());
        }
    }

    /// Stop collecting and return the completed metrics
    pub fn finish(self) -> CommitMetrics {
        let mut metrics = self.metrics.into_inner();
        metrics.complete();
        metrics
    }

    fn local_file(&self, entry: &DeltaEntry) -> Result<LocalFile> {
        let native_path = entry.path.to_native_under(&self.local_root);
        let metadata =
            fs::metadata(&native_path).map_err(|e| SyncError::io_error(&native_path, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| SyncError::io_error(&native_path, e))?;

        Ok(LocalFile {
            path: entry.path.clone(),
            native_path,
            size: metadata.len(),
            modified: DateTime::<Utc>::from(modified),
        })
    }
}
