//! Remote object store interface
//!
//! The engine only ever talks to a remote through [`RemoteStore`]: a narrow,
//! hierarchical file interface. "Not found" is reported as
//! [`std::io::ErrorKind::NotFound`] and is a valid answer, not a failure;
//! every other error kind is a real failure and propagates.

use std::io::{self, Read, Write};

use crate::path::RepoPath;

mod fs;
mod memory;

pub use self::fs::FsStore;
pub use self::memory::MemoryStore;

/// Stat result for a remote object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub is_dir: bool,
    pub len: u64,
}

/// One child returned by [`RemoteStore::read_dir`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub metadata: RemoteMetadata,
}

/// Narrow file-operation interface to the remote content store
pub trait RemoteStore: Send + Sync {
    /// Open an existing object for reading
    fn open(&self, path: &RepoPath) -> io::Result<Box<dyn Read + Send>>;

    /// Create or truncate an object; the parent directory must exist
    fn create(&self, path: &RepoPath) -> io::Result<Box<dyn Write + Send>>;

    /// Create a directory and all missing parents
    fn mkdir_all(&self, path: &RepoPath) -> io::Result<()>;

    /// Remove an object or an empty directory
    fn remove(&self, path: &RepoPath) -> io::Result<()>;

    fn stat(&self, path: &RepoPath) -> io::Result<RemoteMetadata>;

    /// Immediate children of a directory, sorted by name
    fn read_dir(&self, path: &RepoPath) -> io::Result<Vec<RemoteEntry>>;
}

/// Entry yielded by [`RemoteWalker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: RepoPath,
    pub metadata: RemoteMetadata,
}

impl WalkEntry {
    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir
    }
}

/// Lazy depth-first walk of a remote subtree.
///
/// The root is yielded first. A directory's children are only listed when
/// the walk moves past it, so [`RemoteWalker::skip_current_dir`] called right
/// after a directory was yielded prunes the whole subtree without listing it.
pub struct RemoteWalker<'a> {
    store: &'a dyn RemoteStore,
    root: Option<RepoPath>,
    stack: Vec<WalkEntry>,
    descend_into: Option<RepoPath>,
}

impl<'a> RemoteWalker<'a> {
    pub fn new(store: &'a dyn RemoteStore, root: RepoPath) -> Self {
        Self {
            store,
            root: Some(root),
            stack: Vec::new(),
            descend_into: None,
        }
    }

    /// Do not descend into the directory yielded last
    pub fn skip_current_dir(&mut self) {
        self.descend_into = None;
    }
}

impl Iterator for RemoteWalker<'_> {
    type Item = io::Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.root.take() {
            return Some(self.store.stat(&root).map(|metadata| {
                if metadata.is_dir {
                    self.descend_into = Some(root.clone());
                }
                WalkEntry { path: root, metadata }
            }));
        }

        if let Some(dir) = self.descend_into.take() {
            match self.store.read_dir(&dir) {
                Ok(children) => {
                    // reversed so the smallest name is popped first
                    for child in children.into_iter().rev() {
                        self.stack.push(WalkEntry {
                            path: dir.join(&child.name),
                            metadata: child.metadata,
                        });
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }

        let entry = self.stack.pop()?;
        if entry.is_dir() {
            self.descend_into = Some(entry.path.clone());
        }
        Some(Ok(entry))
    }
}
