//! Progress reporting for commit operations

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use crate::diff::DeltaStatus;

/// Progress event types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProgressEvent {
    /// Commit started; `full_push` is set when the remote was empty
    CommitStarted { session_id: Uuid, full_push: bool },
    /// Ignore rules written to the remote
    IgnorePublished { bytes: usize },
    /// Content and record written for one path
    Uploaded {
        path: String,
        status: DeltaStatus,
        bytes: u64,
        duration: Duration,
    },
    /// Content and record removed for one path
    Removed { path: String },
    /// Applying one entry failed
    EntryFailed { path: String, error: String },
    /// Commit finished
    CommitCompleted {
        session_id: Uuid,
        uploaded: usize,
        removed: usize,
        failed: usize,
        bytes: u64,
        duration: Duration,
    },
}

/// Receiving end of a progress channel
pub struct ProgressChannel {
    receiver: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressChannel {
    /// Create a new progress channel
    pub fn new() -> (ProgressReporter, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(sender);
        let channel = Self { receiver };
        (reporter, channel)
    }

    /// Receive the next progress event
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Receive without waiting; `None` when nothing is queued
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }

    /// Close the channel
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Sending end of a progress channel.
///
/// Sends never fail the commit: once the receiver is gone events are dropped.
#[derive(Clone)]
pub struct ProgressReporter {
    sender: mpsc::UnboundedSender<ProgressEvent>,
    session_id: Uuid,
    start_time: Instant,
    state: Arc<Mutex<ProgressState>>,
}

#[derive(Debug, Default)]
struct ProgressState {
    uploaded: usize,
    removed: usize,
    failed: usize,
    bytes: u64,
    current_file: Option<String>,
}

impl ProgressReporter {
    fn new(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            sender,
            session_id: Uuid::new_v4(),
            start_time: Instant::now(),
            state: Arc::new(Mutex::new(ProgressState::default())),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn commit_started(&self, full_push: bool) {
        self.send(ProgressEvent::CommitStarted {
            session_id: self.session_id,
            full_push,
        });
    }

    pub fn ignore_published(&self, bytes: usize) {
        self.send(ProgressEvent::IgnorePublished { bytes });
    }

    pub fn uploaded(
        &self,
        path: impl Into<String>,
        status: DeltaStatus,
        bytes: u64,
        duration: Duration,
    ) {
        let path = path.into();
        {
            let mut state = self.state.lock();
            state.uploaded += 1;
            state.bytes += bytes;
            state.current_file = Some(path.clone());
        }

        self.send(ProgressEvent::Uploaded {
            path,
            status,
            bytes,
            duration,
        });
    }

    pub fn removed(&self, path: impl Into<String>) {
        let path = path.into();
        {
            let mut state = self.state.lock();
            state.removed += 1;
            state.current_file = Some(path.clone());
        }

        self.send(ProgressEvent::Removed { path });
    }

    pub fn entry_failed(&self, path: impl Into<String>, error: impl Into<String>) {
        self.state.lock().failed += 1;
        self.send(ProgressEvent::EntryFailed {
            path: path.into(),
            error: error.into(),
        });
    }

    pub fn commit_completed(&self) {
        let snapshot = self.snapshot();
        self.send(ProgressEvent::CommitCompleted {
            session_id: self.session_id,
            uploaded: snapshot.uploaded,
            removed: snapshot.removed,
            failed: snapshot.failed,
            bytes: snapshot.bytes,
            duration: snapshot.elapsed_time,
        });
    }

    /// Current counters
    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.lock();
        ProgressSnapshot {
            session_id: self.session_id,
            uploaded: state.uploaded,
            removed: state.removed,
            failed: state.failed,
            bytes: state.bytes,
            current_file: state.current_file.clone(),
            elapsed_time: self.start_time.elapsed(),
        }
    }

    fn send(&self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            trace!(session_id = %self.session_id, "progress receiver dropped");
        }
    }
}

/// Snapshot of current progress state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub session_id: Uuid,
    pub uploaded: usize,
    pub removed: usize,
    pub failed: usize,
    pub bytes: u64,
    pub current_file: Option<String>,
    pub elapsed_time: Duration,
}

impl ProgressSnapshot {
    /// Upload rate in bytes per second
    pub fn transfer_rate(&self) -> f64 {
        if self.elapsed_time.as_secs_f64() > 0.0 {
            self.bytes as f64 / self.elapsed_time.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn transfer_rate_human(&self) -> String {
        format_bytes_per_second(self.transfer_rate())
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Format bytes per second as human-readable string
pub fn format_bytes_per_second(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second as u64))
}
