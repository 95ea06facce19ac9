//! In-process remote store

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{RemoteEntry, RemoteMetadata, RemoteStore};
use crate::path::RepoPath;

#[derive(Debug, Default)]
struct Tree {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    denied: BTreeSet<String>,
}

impl Tree {
    fn is_dir(&self, key: &str) -> bool {
        key.is_empty() || key == "/" || self.dirs.contains(key)
    }
}

fn parent_key(key: &str) -> String {
    match key.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

fn not_found(key: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("'{}' does not exist", key))
}

/// Hierarchical store held in memory.
///
/// Clones share the same tree, so a test can keep one handle for
/// inspection while the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tree: Arc<Mutex<Tree>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `create` of `path` fail with `PermissionDenied`
    pub fn deny_writes(&self, path: impl AsRef<str>) {
        self.tree
            .lock()
            .denied
            .insert(RepoPath::new(path).as_str().to_string());
    }

    /// Raw bytes of a stored object
    pub fn read_file(&self, path: impl AsRef<str>) -> Option<Vec<u8>> {
        self.tree
            .lock()
            .files
            .get(RepoPath::new(path).as_str())
            .cloned()
    }

    /// Store an object directly, creating parents
    pub fn insert_file(&self, path: impl AsRef<str>, content: impl Into<Vec<u8>>) {
        let path = RepoPath::new(path);
        let mut tree = self.tree.lock();
        let mut ancestor = parent_key(path.as_str());
        while !tree.is_dir(&ancestor) {
            let next = parent_key(&ancestor);
            tree.dirs.insert(ancestor);
            ancestor = next;
        }
        tree.files.insert(path.as_str().to_string(), content.into());
    }

    pub fn contains_file(&self, path: impl AsRef<str>) -> bool {
        self.tree
            .lock()
            .files
            .contains_key(RepoPath::new(path).as_str())
    }

    /// Keys of all stored objects below `prefix`
    pub fn files_under(&self, prefix: impl AsRef<str>) -> Vec<String> {
        let prefix = RepoPath::new(prefix);
        let dir = format!("{}/", prefix.as_str());
        self.tree
            .lock()
            .files
            .keys()
            .filter(|k| prefix.is_empty() || k.starts_with(&dir))
            .cloned()
            .collect()
    }
}

struct MemoryWriter {
    tree: Arc<Mutex<Tree>>,
    key: String,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut tree = self.tree.lock();
        match tree.files.get_mut(&self.key) {
            Some(content) => {
                content.extend_from_slice(buf);
                Ok(buf.len())
            }
            None => Err(not_found(&self.key)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl RemoteStore for MemoryStore {
    fn open(&self, path: &RepoPath) -> io::Result<Box<dyn Read + Send>> {
        let tree = self.tree.lock();
        let content = tree
            .files
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| not_found(path.as_str()))?;
        Ok(Box::new(Cursor::new(content)))
    }

    fn create(&self, path: &RepoPath) -> io::Result<Box<dyn Write + Send>> {
        let key = path.as_str().to_string();
        let mut tree = self.tree.lock();

        if tree.denied.contains(&key) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("writes to '{}' are denied", key),
            ));
        }
        if tree.is_dir(&key) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("'{}' is a directory", key),
            ));
        }
        if !tree.is_dir(&parent_key(&key)) {
            return Err(not_found(&parent_key(&key)));
        }

        tree.files.insert(key.clone(), Vec::new());
        Ok(Box::new(MemoryWriter {
            tree: Arc::clone(&self.tree),
            key,
        }))
    }

    fn mkdir_all(&self, path: &RepoPath) -> io::Result<()> {
        let mut tree = self.tree.lock();
        let mut current = if path.is_absolute() {
            "/".to_string()
        } else {
            String::new()
        };

        for segment in path.segments() {
            current = RepoPath::new(&current).join(segment).as_str().to_string();
            if tree.files.contains_key(&current) {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("'{}' is not a directory", current),
                ));
            }
            tree.dirs.insert(current.clone());
        }
        Ok(())
    }

    fn remove(&self, path: &RepoPath) -> io::Result<()> {
        let key = path.as_str();
        let mut tree = self.tree.lock();

        if tree.files.remove(key).is_some() {
            return Ok(());
        }
        if tree.dirs.contains(key) {
            let prefix = format!("{}/", key);
            let occupied = tree.files.keys().any(|k| k.starts_with(&prefix))
                || tree.dirs.iter().any(|d| d.starts_with(&prefix));
            if occupied {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("directory '{}' is not empty", key),
                ));
            }
            tree.dirs.remove(key);
            return Ok(());
        }
        Err(not_found(key))
    }

    fn stat(&self, path: &RepoPath) -> io::Result<RemoteMetadata> {
        let tree = self.tree.lock();
        if let Some(content) = tree.files.get(path.as_str()) {
            return Ok(RemoteMetadata {
                is_dir: false,
                len: content.len() as u64,
            });
        }
        if tree.is_dir(path.as_str()) {
            return Ok(RemoteMetadata { is_dir: true, len: 0 });
        }
        Err(not_found(path.as_str()))
    }

    fn read_dir(&self, path: &RepoPath) -> io::Result<Vec<RemoteEntry>> {
        let key = path.as_str();
        let tree = self.tree.lock();
        if !tree.is_dir(key) {
            return Err(not_found(key));
        }

        let mut entries: Vec<RemoteEntry> = tree
            .dirs
            .iter()
            .filter(|d| parent_key(d) == key && d.as_str() != key)
            .map(|d| RemoteEntry {
                name: d.rsplit('/').next().unwrap_or_default().to_string(),
                metadata: RemoteMetadata { is_dir: true, len: 0 },
            })
            .chain(
                tree.files
                    .iter()
                    .filter(|(f, _)| parent_key(f) == key)
                    .map(|(f, content)| RemoteEntry {
                        name: f.rsplit('/').next().unwrap_or_default().to_string(),
                        metadata: RemoteMetadata {
                            is_dir: false,
                            len: content.len() as u64,
                        },
                    }),
            )
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_needs_parent_directory() {
        let store = MemoryStore::new();
        let err = store.create(&RepoPath::new("a/b.txt")).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        store.mkdir_all(&RepoPath::new("a")).unwrap();
        store
            .create(&RepoPath::new("a/b.txt"))
            .unwrap()
            .write_all(b"data")
            .unwrap();
        assert_eq!(store.read_file("a/b.txt").unwrap(), b"data");
    }

    #[test]
    fn test_create_truncates() {
        let store = MemoryStore::new();
        store.insert_file("x.txt", "old content");
        store.create(&RepoPath::new("x.txt")).unwrap().write_all(b"new").unwrap();
        assert_eq!(store.read_file("x.txt").unwrap(), b"new");
    }

    #[test]
    fn test_absolute_paths() {
        let store = MemoryStore::new();
        store.mkdir_all(&RepoPath::new("/srv/project")).unwrap();
        store
            .create(&RepoPath::new("/srv/project/ignore"))
            .unwrap()
            .write_all(b"*.log")
            .unwrap();

        let names: Vec<_> = store
            .read_dir(&RepoPath::new("/srv/project"))
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["ignore"]);
        assert!(store.read_dir(&RepoPath::new("/")).unwrap()[0].metadata.is_dir);
    }

    #[test]
    fn test_remove_semantics() {
        let store = MemoryStore::new();
        store.insert_file("d/f.txt", "x");

        let err = store.remove(&RepoPath::new("d")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);

        store.remove(&RepoPath::new("d/f.txt")).unwrap();
        store.remove(&RepoPath::new("d")).unwrap();
        let err = store.remove(&RepoPath::new("d")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_denied_writes() {
        let store = MemoryStore::new();
        store.deny_writes("locked.txt");
        let err = store.create(&RepoPath::new("locked.txt")).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }
}
