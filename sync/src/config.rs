//! Project descriptor stored as `.pushsync.yaml` at the local root

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::filter::PROJECT_FILE_NAME;

/// Descriptor format understood by this build
pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub version: u32,
    pub remote: RemoteConfig,
    /// Ignore rule text, gitignore syntax
    #[serde(default)]
    pub ignore: String,
    /// Identity recorded as last editor; the OS user when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Directory acting as the remote root
    pub path: PathBuf,
}

impl ProjectConfig {
    pub fn new(remote: impl Into<PathBuf>, ignore: impl Into<String>) -> Self {
        Self {
            version: CONFIG_VERSION,
            remote: RemoteConfig {
                path: remote.into(),
            },
            ignore: ignore.into(),
            editor: None,
        }
    }

    /// Descriptor location for a project rooted at `root`
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(PROJECT_FILE_NAME)
    }

    /// Whether `root` has a descriptor. A directory in its place is an error.
    pub fn exists(root: &Path) -> Result<bool> {
        let path = Self::path_in(root);
        match fs::metadata(&path) {
            Ok(metadata) if metadata.is_dir() => Err(SyncError::config_error(
                path,
                "project file is a directory",
            )),
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::io_error(path, e)),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path_in(root);
        let content = fs::read_to_string(&path).map_err(|e| SyncError::io_error(&path, e))?;
        let config: ProjectConfig = serde_yaml::from_str(&content)
            .map_err(|e| SyncError::config_error(&path, e.to_string()))?;
        config.validate(&path)?;
        debug!(path = %path.display(), "loaded project descriptor");
        Ok(config)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = Self::path_in(root);
        self.validate(&path)?;
        let content = serde_yaml::to_string(self)?;
        fs::write(&path, content).map_err(|e| SyncError::io_error(&path, e))
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(SyncError::config_error(
                path,
                format!("unsupported version {} (expected {})", self.version, CONFIG_VERSION),
            ));
        }
        if self.remote.path.as_os_str().is_empty() {
            return Err(SyncError::config_error(path, "remote.path must not be empty"));
        }
        Ok(())
    }
}

/// Starting ignore rules offered by `init`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IgnoreTemplate {
    #[default]
    Default,
    Godot,
    Unreal,
    Bevy,
}

impl IgnoreTemplate {
    pub const ALL: [IgnoreTemplate; 4] = [
        IgnoreTemplate::Default,
        IgnoreTemplate::Godot,
        IgnoreTemplate::Unreal,
        IgnoreTemplate::Bevy,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            IgnoreTemplate::Default => "default",
            IgnoreTemplate::Godot => "godot",
            IgnoreTemplate::Unreal => "unreal",
            IgnoreTemplate::Bevy => "bevy",
        }
    }

    pub fn rules(&self) -> &'static str {
        match self {
            IgnoreTemplate::Default => DEFAULT_RULES,
            IgnoreTemplate::Godot => GODOT_RULES,
            IgnoreTemplate::Unreal => UNREAL_RULES,
            IgnoreTemplate::Bevy => BEVY_RULES,
        }
    }
}

impl FromStr for IgnoreTemplate {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|template| template.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                SyncError::config_error(
                    PROJECT_FILE_NAME,
                    format!("unknown ignore template '{}'", s),
                )
            })
    }
}

const DEFAULT_RULES: &str = "# OS
.DS_Store
Thumbs.db

# Git
.git/
.gitattributes
.gitignore
";

const GODOT_RULES: &str = "# Godot 4+ specific ignores
.godot/

# Godot-specific ignores
.import/
export.cfg
export_credentials.cfg

# Imported translations (automatically generated from CSV files)
*.translation

# Mono-specific ignores
.mono/
data_*/
mono_crash.*.json

# OS
.DS_Store

# Git
.git/
.gitattributes
.gitignore
";

const UNREAL_RULES: &str = "# Build and cache output
Binaries/
Build/
DerivedDataCache/
Intermediate/
Saved/

# IDE
.vs/
.idea/
*.sln
*.VC.db

# OS
.DS_Store

# Git
.git/
.gitattributes
.gitignore
";

const BEVY_RULES: &str = "# Cargo build output
target/
Cargo.lock

# Imported asset cache
imported_assets/

# OS
.DS_Store

# Git
.git/
.gitattributes
.gitignore
";
