//! Error types for the reconciliation engine

use std::io;
use std::path::PathBuf;

/// Result type alias for pushsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type for every engine operation
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Local filesystem read or stat failure
    #[error("IO error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Remote store call failure
    #[error("Remote error at '{path}': {source}")]
    Remote {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Malformed remote metadata
    #[error("Invalid remote data at '{path}': {message}")]
    Validation { path: String, message: String },

    /// Ignore rule that could not be compiled
    #[error("Ignore pattern error: {0}")]
    IgnorePattern(String),

    /// Failure while handling one path, tagged with its canonical form
    #[error("Failed at '{path}': {source}")]
    Entry {
        path: String,
        #[source]
        source: Box<SyncError>,
    },

    /// Project descriptor errors
    #[error("Config error at '{path}': {message}")]
    Config { path: PathBuf, message: String },

    /// The external selection step failed or was cancelled
    #[error("Selection error: {0}")]
    Selection(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Project descriptor (de)serialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SyncError {
    /// Create a new local IO error
    pub fn io_error(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a new remote error
    pub fn remote_error(path: impl Into<String>, source: io::Error) -> Self {
        Self::Remote {
            path: path.into(),
            source,
        }
    }

    /// Create a new validation error
    pub fn validation_error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap an error with the canonical path that triggered it
    pub fn entry_error(path: impl Into<String>, source: SyncError) -> Self {
        Self::Entry {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Create a new config error
    pub fn config_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True when this is a remote "not found" signal rather than a failure
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Remote { source, .. } => source.kind() == io::ErrorKind::NotFound,
            Self::Entry { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// The canonical path attached by the walk or transfer layer, if any
    pub fn entry_path(&self) -> Option<&str> {
        match self {
            Self::Entry { path, .. } => Some(path),
            _ => None,
        }
    }
}
