//! Integration test harness with a temporary project and directory remote

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::config::{IgnoreTemplate, ProjectConfig};
use crate::diff::{Delta, DeltaEntry, DeltaStatus, StatusFilter};
use crate::error::{Result, SyncError};
use crate::path::RepoPath;
use crate::records::RecordStore;
use crate::sync_engine::{CommitOptions, CommitOutcome, CommitResult, SyncEngine};

/// A local project tree and a remote directory, both removed on drop
pub struct TempProject {
    temp_dir: TempDir,
    config: ProjectConfig,
}

impl TempProject {
    /// Create the tree, the remote and a saved descriptor
    pub fn new(ignore: &str) -> Result<Self> {
        let temp_dir = TempDir::new().map_err(|e| SyncError::io_error("tempdir", e))?;
        let local = temp_dir.path().join("local");
        let remote = temp_dir.path().join("remote");
        for dir in [&local, &remote] {
            fs::create_dir_all(dir).map_err(|e| SyncError::io_error(dir, e))?;
        }

        let config = ProjectConfig::new(&remote, ignore);
        config.save(&local)?;
        Ok(Self { temp_dir, config })
    }

    pub fn local(&self) -> PathBuf {
        self.temp_dir.path().join("local")
    }

    pub fn remote(&self) -> PathBuf {
        self.temp_dir.path().join("remote")
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn write(&self, path: &str, content: impl AsRef<[u8]>) {
        let native = RepoPath::new(path).to_native_under(&self.local());
        if let Some(parent) = native.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(native, content).unwrap();
    }

    pub fn remove(&self, path: &str) {
        fs::remove_file(RepoPath::new(path).to_native_under(&self.local())).unwrap();
    }

    /// Engine built from the descriptor on disk, the way the CLI builds it
    pub fn engine(&self, editor: &str) -> Result<SyncEngine> {
        let config = ProjectConfig::load(&self.local())?;
        crate::open_engine(self.local(), &config, CommitOptions::new(editor))
    }

    pub fn records(&self) -> Result<RecordStore> {
        crate::connect(&self.config)
    }

    pub fn commit_all(&self, editor: &str) -> Result<CommitResult> {
        self.engine(editor)?.commit(&mut StatusFilter::all())
    }

    pub fn remote_file(&self, relative: &str) -> PathBuf {
        RepoPath::new(relative).to_native_under(&self.remote())
    }
}

fn paths(delta: &Delta) -> Vec<(String, DeltaStatus)> {
    delta
        .iter()
        .map(|entry| (entry.path.to_string(), entry.status))
        .collect()
}

fn exists(path: &Path) -> bool {
    path.exists()
}

#[test_log::test]
fn test_initial_commit_writes_remote_layout() {
    let project = TempProject::new("*.log\n").unwrap();
    project.write("a.txt", "alpha");
    project.write("b/c.txt", "gamma");
    project.write("debug.log", "noise");

    let result = project.commit_all("frank").unwrap();
    match &result.outcome {
        CommitOutcome::Initial { pushed } => assert_eq!(pushed.len(), 2),
        other => panic!("Expected Initial outcome, got {:?}", other),
    }

    assert_eq!(fs::read_to_string(project.remote_file("ignore")).unwrap(), "*.log\n");
    assert!(exists(&project.remote_file("meta/a.txt")));
    assert!(exists(&project.remote_file("meta/b/c.txt")));
    assert!(exists(&project.remote_file("content/a.txt.gz")));
    assert!(exists(&project.remote_file("content/b/c.txt.gz")));
    assert!(!exists(&project.remote_file("meta/debug.log")));
    assert!(!exists(&project.remote_file("meta/.pushsync.yaml")));
}

#[test_log::test]
fn test_incremental_commit_applies_selection_in_order() {
    let project = TempProject::new("").unwrap();
    project.write("keep.txt", "same");
    project.write("edit.txt", "v1");
    project.write("drop.txt", "bye");
    project.commit_all("frank").unwrap();

    project.write("edit.txt", "v2");
    project.write("new/file.txt", "hello");
    project.remove("drop.txt");

    let engine = project.engine("grace").unwrap();
    let status = engine.status().unwrap();
    assert_eq!(
        paths(&status),
        vec![
            ("edit.txt".to_string(), DeltaStatus::Change),
            ("new/file.txt".to_string(), DeltaStatus::Create),
            ("drop.txt".to_string(), DeltaStatus::Delete),
        ]
    );

    let mut seen = Vec::new();
    let mut reversed = |delta: &Delta| -> Result<Vec<DeltaEntry>> {
        seen = delta.entries().to_vec();
        Ok(delta.iter().rev().cloned().collect())
    };
    let result = engine.commit(&mut reversed).unwrap();
    assert_eq!(seen.len(), 3);

    match &result.outcome {
        CommitOutcome::Incremental { report, .. } => {
            let applied: Vec<&str> = report.applied.iter().map(|e| e.path.as_str()).collect();
            assert_eq!(applied, vec!["drop.txt", "new/file.txt", "edit.txt"]);
        }
        other => panic!("Expected Incremental outcome, got {:?}", other),
    }

    let records = project.records().unwrap();
    assert_eq!(records.read_record(&RepoPath::new("edit.txt")).unwrap().last_editor, "grace");
    assert_eq!(records.read_record(&RepoPath::new("keep.txt")).unwrap().last_editor, "frank");
    assert!(!exists(&project.remote_file("meta/drop.txt")));
    assert!(!exists(&project.remote_file("content/drop.txt.gz")));
    assert!(engine.status().unwrap().is_empty());
}

#[test_log::test]
fn test_skipping_deletes_leaves_them_pending() {
    let project = TempProject::new("").unwrap();
    project.write("a.txt", "a");
    project.write("b.txt", "b");
    project.commit_all("frank").unwrap();

    project.remove("b.txt");
    project.write("c.txt", "c");

    let engine = project.engine("frank").unwrap();
    engine.commit(&mut StatusFilter::uploads_only()).unwrap();

    assert_eq!(
        paths(&engine.status().unwrap()),
        vec![("b.txt".to_string(), DeltaStatus::Delete)]
    );
}

#[test_log::test]
fn test_keep_going_reports_each_failure() {
    let project = TempProject::new("").unwrap();
    project.write("a.txt", "a");
    project.commit_all("frank").unwrap();

    project.write("x.txt", "x");
    project.write("y.txt", "y");

    let mut engine_options = CommitOptions::new("frank");
    engine_options.continue_on_error = true;
    let config = ProjectConfig::load(&project.local()).unwrap();
    let engine = crate::open_engine(project.local(), &config, engine_options).unwrap();

    // x.txt vanishes between the delta and the transfer
    let local = project.local();
    let mut racing = |delta: &Delta| -> Result<Vec<DeltaEntry>> {
        fs::remove_file(local.join("x.txt")).unwrap();
        Ok(delta.entries().to_vec())
    };
    let result = engine.commit(&mut racing).unwrap();

    match &result.outcome {
        CommitOutcome::Incremental { report, .. } => {
            assert_eq!(report.applied.len(), 1);
            assert_eq!(report.failed.len(), 1);
            assert_eq!(report.failed[0].1.entry_path(), Some("x.txt"));
        }
        other => panic!("Expected Incremental outcome, got {:?}", other),
    }
    assert_eq!(result.metrics.files.failed, 1);
    assert_eq!(result.metrics.files.created, 1);
}

#[test_log::test]
fn test_rerun_after_changing_ignore_rules_publishes_them() {
    let project = TempProject::new("").unwrap();
    project.write("a.txt", "a");
    project.write("trace.log", "t");
    project.commit_all("frank").unwrap();

    let mut config = ProjectConfig::load(&project.local()).unwrap();
    config.ignore = IgnoreTemplate::Default.rules().to_string() + "*.log\n";
    config.save(&project.local()).unwrap();

    let engine = project.engine("frank").unwrap();
    assert!(engine.status().unwrap().is_empty());
    engine.commit(&mut StatusFilter::all()).unwrap();

    let published = project.records().unwrap().read_ignore().unwrap().unwrap();
    assert!(published.ends_with("*.log\n"));
}

#[test_log::test]
fn test_file_replaced_by_directory_pushes_after_delete() {
    let project = TempProject::new("").unwrap();
    project.write("x", "file");
    project.commit_all("frank").unwrap();

    project.remove("x");
    project.write("x/y", "nested");

    let engine = project.engine("frank").unwrap();
    assert_eq!(
        paths(&engine.status().unwrap()),
        vec![
            ("x/y".to_string(), DeltaStatus::Create),
            ("x".to_string(), DeltaStatus::Delete),
        ]
    );

    // the remote record for `x` blocks the directory
    assert!(engine.commit(&mut StatusFilter::all()).is_err());
    assert_eq!(engine.status().unwrap().len(), 2);

    let mut deletes_only = |delta: &Delta| -> Result<Vec<DeltaEntry>> {
        Ok(delta.iter().filter(|e| !e.is_upload()).cloned().collect())
    };
    engine.commit(&mut deletes_only).unwrap();
    engine.commit(&mut StatusFilter::all()).unwrap();
    assert!(engine.status().unwrap().is_empty());

    let mut restored = Vec::new();
    project
        .records()
        .unwrap()
        .download(&RepoPath::new("x/y"), &mut restored)
        .unwrap();
    assert_eq!(restored, b"nested");
}

#[test_log::test]
fn test_download_restores_bytes() {
    let project = TempProject::new("").unwrap();
    let content: Vec<u8> = (0..=255u8).cycle().take(300_000).collect();
    project.write("assets/level.bin", &content);
    project.commit_all("frank").unwrap();

    let mut restored = Vec::new();
    let record = project
        .records()
        .unwrap()
        .download(&RepoPath::new("assets/level.bin"), &mut restored)
        .unwrap();
    assert_eq!(restored, content);
    assert_eq!(record.last_editor, "frank");
}

#[tokio::test]
async fn test_progress_events_across_blocking_commit() {
    use crate::progress::{ProgressChannel, ProgressEvent};

    let project = TempProject::new("").unwrap();
    project.write("one.txt", "1");
    project.write("two.txt", "2");

    let (reporter, mut channel) = ProgressChannel::new();
    let engine = project.engine("frank").unwrap().with_progress(reporter);
    let handle = tokio::task::spawn_blocking(move || engine.commit(&mut StatusFilter::all()));

    let mut uploaded = 0;
    let mut completed = false;
    while let Some(event) = channel.recv().await {
        match event {
            ProgressEvent::Uploaded { .. } => uploaded += 1,
            ProgressEvent::CommitCompleted { uploaded: total, .. } => {
                assert_eq!(total, 2);
                completed = true;
            }
            _ => {}
        }
    }

    let result = handle.await.unwrap().unwrap();
    assert_eq!(uploaded, 2);
    assert!(completed);
    assert_eq!(result.metrics.files.uploaded(), 2);
}
