//! Remote store backed by a directory on a reachable filesystem
//! (network mount, removable drive, or a plain local path).

use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::{RemoteEntry, RemoteMetadata, RemoteStore};
use crate::path::RepoPath;

/// Directory-backed [`RemoteStore`]; remote paths resolve beneath `base`
#[derive(Debug, Clone)]
pub struct FsStore {
    base: PathBuf,
}

impl FsStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, path: &RepoPath) -> io::Result<PathBuf> {
        if path.segments().contains(&"..") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("remote path '{}' escapes the store", path),
            ));
        }
        Ok(path.to_native_under(&self.base))
    }

    /// A path beneath a regular file cannot exist; report it as missing
    fn below_file_as_missing(&self, target: &Path, e: io::Error) -> io::Error {
        let below_file = e.kind() != io::ErrorKind::NotFound
            && target
                .ancestors()
                .skip(1)
                .take_while(|dir| dir.starts_with(&self.base))
                .any(Path::is_file);
        if below_file {
            return io::Error::new(
                io::ErrorKind::NotFound,
                format!("'{}' lies below a file", target.display()),
            );
        }
        e
    }
}

fn metadata_of(meta: &fs::Metadata) -> RemoteMetadata {
    RemoteMetadata {
        is_dir: meta.is_dir(),
        len: if meta.is_dir() { 0 } else { meta.len() },
    }
}

impl RemoteStore for FsStore {
    fn open(&self, path: &RepoPath) -> io::Result<Box<dyn Read + Send>> {
        let target = self.resolve(path)?;
        let file = fs::File::open(&target).map_err(|e| self.below_file_as_missing(&target, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn create(&self, path: &RepoPath) -> io::Result<Box<dyn Write + Send>> {
        let file = fs::File::create(self.resolve(path)?)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn mkdir_all(&self, path: &RepoPath) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path)?)
    }

    fn remove(&self, path: &RepoPath) -> io::Result<()> {
        let target = self.resolve(path)?;
        let meta = fs::symlink_metadata(&target)
            .map_err(|e| self.below_file_as_missing(&target, e))?;
        if meta.is_dir() {
            fs::remove_dir(target)
        } else {
            fs::remove_file(target)
        }
    }

    fn stat(&self, path: &RepoPath) -> io::Result<RemoteMetadata> {
        let target = self.resolve(path)?;
        let meta = fs::metadata(&target).map_err(|e| self.below_file_as_missing(&target, e))?;
        Ok(metadata_of(&meta))
    }

    fn read_dir(&self, path: &RepoPath) -> io::Result<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path)?)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            entries.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                metadata: metadata_of(&meta),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
