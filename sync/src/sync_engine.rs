//! Commit orchestration: picks a full push or an incremental commit

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::diff::{Delta, DeltaEntry, Reconciler, StatusFilter};
use crate::error::{Result, SyncError};
use crate::filter::IgnoreMatcher;
use crate::metrics::CommitMetrics;
use crate::path::RepoPath;
use crate::progress::ProgressReporter;
use crate::records::RecordStore;
use crate::transfer::{TransferDriver, TransferReport};

/// Run-time settings for a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOptions {
    /// Identity written into every record this commit produces
    pub editor: String,
    /// Keep applying selected entries after one fails (incremental commits only)
    pub continue_on_error: bool,
}

impl CommitOptions {
    pub fn new(editor: impl Into<String>) -> Self {
        Self {
            editor: editor.into(),
            continue_on_error: false,
        }
    }
}

/// Remote state observed when a commit starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitState {
    /// Nothing under the remote root yet
    Empty,
    NonEmpty,
}

/// Chooses which delta entries a commit applies
pub trait Selector {
    /// Return the entries to apply, in application order
    fn select(&mut self, delta: &Delta) -> Result<Vec<DeltaEntry>>;
}

impl<F> Selector for F
where
    F: FnMut(&Delta) -> Result<Vec<DeltaEntry>>,
{
    fn select(&mut self, delta: &Delta) -> Result<Vec<DeltaEntry>> {
        self(delta)
    }
}

impl Selector for StatusFilter {
    fn select(&mut self, delta: &Delta) -> Result<Vec<DeltaEntry>> {
        Ok(delta.filter(self).into_entries())
    }
}

/// What one commit did
#[derive(Debug)]
pub enum CommitOutcome {
    /// The remote was empty and every local file was pushed
    Initial { pushed: Vec<RepoPath> },
    /// A delta was computed and the selected part applied
    Incremental { delta: Delta, report: TransferReport },
}

#[derive(Debug)]
pub struct CommitResult {
    pub state: CommitState,
    pub outcome: CommitOutcome,
    pub metrics: CommitMetrics,
}

/// Top-level engine for one local tree and one remote root
pub struct SyncEngine {
    local_root: PathBuf,
    ignore_text: String,
    matcher: IgnoreMatcher,
    records: RecordStore,
    options: CommitOptions,
    progress: Option<ProgressReporter>,
}

impl SyncEngine {
    /// Compile `ignore_text` and bind the engine to `records`
    pub fn new(
        local_root: impl Into<PathBuf>,
        ignore_text: impl Into<String>,
        records: RecordStore,
        options: CommitOptions,
    ) -> Result<Self> {
        let ignore_text = ignore_text.into();
        let matcher = IgnoreMatcher::new(&ignore_text)?;

        Ok(Self {
            local_root: local_root.into(),
            ignore_text,
            matcher,
            records,
            options,
            progress: None,
        })
    }

    pub fn with_progress(mut self, reporter: ProgressReporter) -> Self {
        self.progress = Some(reporter);
        self
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    pub fn matcher(&self) -> &IgnoreMatcher {
        &self.matcher
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn options(&self) -> &CommitOptions {
        &self.options
    }

    /// One listing of the remote root
    pub fn state(&self) -> Result<CommitState> {
        if self.records.is_empty()? {
            Ok(CommitState::Empty)
        } else {
            Ok(CommitState::NonEmpty)
        }
    }

    /// What a commit would do, without touching the remote
    pub fn status(&self) -> Result<Delta> {
        let reconciler = self.reconciler();
        match self.state()? {
            CommitState::Empty => reconciler.local_creates(),
            CommitState::NonEmpty => reconciler.compute_delta(),
        }
    }

    /// Run exactly one commit pass.
    ///
    /// The ignore rules are published before anything else in both states.
    /// `selector` is only consulted for an incremental commit with a
    /// non-empty delta.
    #[instrument(skip_all, fields(root = %self.local_root.display()))]
    pub fn commit(&self, selector: &mut dyn Selector) -> Result<CommitResult> {
        let state = self.state()?;
        info!(state = ?state, editor = %self.options.editor, "starting commit");
        if let Some(progress) = &self.progress {
            progress.commit_started(state == CommitState::Empty);
        }

        self.records.publish_ignore(&self.ignore_text)?;
        if let Some(progress) = &self.progress {
            progress.ignore_published(self.ignore_text.len());
        }

        let mut driver = TransferDriver::new(&self.records, &self.local_root, &self.options.editor);
        if let Some(progress) = &self.progress {
            driver = driver.with_progress(progress.clone());
        }
        let reconciler = self.reconciler();

        let outcome = match state {
            CommitState::Empty => match reconciler.full_push(&driver) {
                Ok(pushed) => CommitOutcome::Initial { pushed },
                Err(e) => {
                    let path = e.entry_path().unwrap_or_default().to_string();
                    driver.record_failure(&path, &e);
                    return Err(e);
                }
            },
            CommitState::NonEmpty => {
                let delta = reconciler.compute_delta()?;
                let report = if delta.is_empty() {
                    info!("nothing to commit");
                    TransferReport::default()
                } else {
                    let selected = selector.select(&delta)?;
                    check_selection(&delta, &selected)?;
                    info!(selected = selected.len(), of = delta.len(), "applying selection");
                    driver.apply_all(&selected, self.options.continue_on_error)?
                };
                CommitOutcome::Incremental { delta, report }
            }
        };

        let metrics = driver.finish();
        if let Some(progress) = &self.progress {
            progress.commit_completed();
        }

        Ok(CommitResult {
            state,
            outcome,
            metrics,
        })
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(self.local_root.clone(), &self.matcher, &self.records)
    }
}

/// A selection may only contain entries of the delta it was given, each once
fn check_selection(delta: &Delta, selected: &[DeltaEntry]) -> Result<()> {
    let mut seen = HashSet::new();
    for entry in selected {
        if !delta.entries().contains(entry) {
            return Err(SyncError::Selection(format!(
                "'{}' is not part of the delta",
                entry.path
            )));
        }
        if !seen.insert(&entry.path) {
            return Err(SyncError::Selection(format!(
                "'{}' was selected twice",
                entry.path
            )));
        }
    }
    Ok(())
}
