//! pushsync engine library
//!
//! Pushes a local project tree to a shared remote directory:
//! - Local scanning with gitignore-style exclusion
//! - SHA-256 content fingerprints and per-path remote records
//! - Delta classification (create, change, delete) against the remote
//! - Compressed uploads, record removal and verified downloads
//! - Progress reporting and commit metrics

pub mod config;
pub mod diff;
pub mod error;
pub mod filter;
pub mod hash;
pub mod metrics;
pub mod path;
pub mod progress;
pub mod records;
pub mod remote;
pub mod scanner;
pub mod sync_engine;
pub mod transfer;

use std::path::Path;
use std::sync::Arc;

// Re-export main types and functions
pub use config::{IgnoreTemplate, ProjectConfig, RemoteConfig};
pub use diff::{Delta, DeltaEntry, DeltaStatus, DeltaSummary, Reconciler, Revision, StatusFilter};
pub use error::{Result, SyncError};
pub use filter::{IgnoreMatcher, METADATA_DIR_NAME, PROJECT_FILE_NAME};
pub use hash::{hash_file, ContentHash};
pub use metrics::{CommitMetrics, FileStats};
pub use path::RepoPath;
pub use progress::{ProgressChannel, ProgressEvent, ProgressReporter};
pub use records::{ContentRecord, RecordStore};
pub use remote::{FsStore, MemoryStore, RemoteStore, RemoteWalker};
pub use scanner::{DirectoryScanner, LocalFile};
pub use sync_engine::{
    CommitOptions, CommitOutcome, CommitResult, CommitState, Selector, SyncEngine,
};
pub use transfer::{TransferDriver, TransferReport};

/// Connect to the remote directory named by `config`
pub fn connect(config: &ProjectConfig) -> Result<RecordStore> {
    let store = FsStore::new(&config.remote.path);
    RecordStore::connect(Arc::new(store), RepoPath::new(""))
}

/// Build an engine for the project rooted at `local_root`
pub fn open_engine(
    local_root: impl AsRef<Path>,
    config: &ProjectConfig,
    options: CommitOptions,
) -> Result<SyncEngine> {
    let records = connect(config)?;
    SyncEngine::new(local_root.as_ref(), config.ignore.as_str(), records, options)
}

#[cfg(test)]
pub mod integration_tests;
