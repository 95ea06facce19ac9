//! Ignore rules with gitignore semantics, using the `ignore` crate
//!
//! Rules are evaluated in declared order and the last matching rule decides;
//! `!pattern` re-includes, `dir/` only matches directories. Two rules are
//! always appended: the project descriptor and the engine metadata directory.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{Result, SyncError};
use crate::path::RepoPath;

/// Project descriptor kept at the root of every local tree
pub const PROJECT_FILE_NAME: &str = ".pushsync.yaml";

/// Directory reserved for the engine's own local state
pub const METADATA_DIR_NAME: &str = ".pushsync";

/// Rules that are active regardless of the project's ignore text
pub const MANDATORY_EXCLUDES: [&str; 2] = [PROJECT_FILE_NAME, METADATA_DIR_NAME];

/// Split ignore text into patterns, dropping blank lines and `#` comments
pub fn parse_rules(rule_text: &str) -> Vec<String> {
    rule_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Compiled, immutable ignore ruleset
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    gitignore: Gitignore,
    patterns: Vec<String>,
}

impl IgnoreMatcher {
    /// Compile the project's rule text plus the mandatory excludes
    pub fn new(rule_text: &str) -> Result<Self> {
        Self::compile(rule_text, &MANDATORY_EXCLUDES)
    }

    /// Compile rule text followed by `extra_excludes`, in that order
    pub fn compile(rule_text: &str, extra_excludes: &[&str]) -> Result<Self> {
        let mut patterns = parse_rules(rule_text);
        patterns.extend(extra_excludes.iter().map(|p| p.to_string()));

        let mut builder = GitignoreBuilder::new(".");
        for pattern in &patterns {
            builder.add_line(None, pattern).map_err(|e| {
                SyncError::IgnorePattern(format!("Failed to compile '{}': {}", pattern, e))
            })?;
        }

        let gitignore = builder.build().map_err(|e| {
            SyncError::IgnorePattern(format!("Failed to build ignore rules: {}", e))
        })?;

        Ok(Self {
            gitignore,
            patterns,
        })
    }

    /// True when `path` is excluded.
    ///
    /// A path inside an excluded directory is excluded as well, so the
    /// answer does not depend on whether a walker pruned the parent.
    ///
    /// Walks only produce relative paths. An absolute path is matched on its
    /// own, never against its parents, because the gitignore matcher panics
    /// on paths outside its root.
    pub fn is_ignored(&self, path: &RepoPath, is_dir: bool) -> bool {
        if path.is_empty() {
            return false;
        }

        let candidate = Path::new(path.as_str());
        if path.is_absolute() {
            return self.gitignore.matched(candidate, is_dir).is_ignore();
        }
        self.gitignore
            .matched_path_or_any_parents(candidate, is_dir)
            .is_ignore()
    }

    /// Every active pattern, mandatory ones last
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Number of active patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
