//! Per-path content records and compressed blobs in the remote store
//!
//! Remote layout beneath the configured root:
//!
//! ```text
//! <root>/ignore                      raw ignore rule text
//! <root>/meta/<canonical path>       JSON ContentRecord
//! <root>/content/<canonical path>.gz gzip-compressed file content
//! ```
//!
//! A path is present on the remote only when both its record and its blob
//! exist; a half-written pair counts as absent.

use std::io::{self, Read, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{Result, SyncError};
use crate::filter::IgnoreMatcher;
use crate::hash::{ContentHash, HashingWriter};
use crate::path::RepoPath;
use crate::remote::{RemoteStore, RemoteWalker};

pub const IGNORE_FILE: &str = "ignore";
pub const META_DIR: &str = "meta";
pub const CONTENT_DIR: &str = "content";
pub const CONTENT_SUFFIX: &str = ".gz";

const BUFFER_SIZE: usize = 64 * 1024;

/// Metadata stored next to each content blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// SHA-256 of the uncompressed content
    pub hash: ContentHash,
    /// Who pushed this version
    pub last_editor: String,
    /// Modification time of the local file when it was pushed
    pub last_edit: DateTime<Utc>,
}

/// Accessor for records and blobs under one remote root
#[derive(Clone)]
pub struct RecordStore {
    store: Arc<dyn RemoteStore>,
    root: RepoPath,
}

impl RecordStore {
    pub fn new(store: Arc<dyn RemoteStore>, root: RepoPath) -> Self {
        Self { store, root }
    }

    /// Build the accessor and make sure the remote root exists
    pub fn connect(store: Arc<dyn RemoteStore>, root: RepoPath) -> Result<Self> {
        let records = Self::new(store, root);
        records.ensure_dir(&records.root)?;
        Ok(records)
    }

    pub fn root(&self) -> &RepoPath {
        &self.root
    }

    pub fn store(&self) -> &dyn RemoteStore {
        self.store.as_ref()
    }

    pub fn meta_key(&self, path: &RepoPath) -> RepoPath {
        self.root.join(META_DIR).join(path)
    }

    pub fn content_key(&self, path: &RepoPath) -> RepoPath {
        self.root
            .join(CONTENT_DIR)
            .join(path)
            .with_suffix(CONTENT_SUFFIX)
    }

    /// True when the remote root has no entries at all
    pub fn is_empty(&self) -> Result<bool> {
        let entries = self
            .store
            .read_dir(&self.root)
            .map_err(|e| SyncError::remote_error(self.root.as_str(), e))?;
        Ok(entries.is_empty())
    }

    /// Overwrite `<root>/ignore` with the project's rule text
    pub fn publish_ignore(&self, rule_text: &str) -> Result<()> {
        let key = self.root.join(IGNORE_FILE);
        let remote_err = |e| SyncError::remote_error(key.as_str(), e);

        let mut writer = self.store.create(&key).map_err(remote_err)?;
        writer.write_all(rule_text.as_bytes()).map_err(remote_err)?;
        writer.flush().map_err(remote_err)?;
        debug!(bytes = rule_text.len(), "published ignore rules");
        Ok(())
    }

    /// Rule text currently published on the remote, if any
    pub fn read_ignore(&self) -> Result<Option<String>> {
        let key = self.root.join(IGNORE_FILE);
        let mut reader = match self.store.open(&key) {
            Ok(reader) => reader,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::remote_error(key.as_str(), e)),
        };

        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| SyncError::remote_error(key.as_str(), e))?;
        Ok(Some(text))
    }

    /// Both the blob and the record must be present
    pub fn exists(&self, path: &RepoPath) -> Result<bool> {
        for key in [self.content_key(path), self.meta_key(path)] {
            match self.store.stat(&key) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
                Err(e) => return Err(SyncError::remote_error(key.as_str(), e)),
            }
        }
        Ok(true)
    }

    /// Fetch and parse the record for `path`
    pub fn read_record(&self, path: &RepoPath) -> Result<ContentRecord> {
        let content_key = self.content_key(path);
        self.store
            .stat(&content_key)
            .map_err(|e| SyncError::remote_error(content_key.as_str(), e))?;

        self.read_meta(&self.meta_key(path))
    }

    fn read_meta(&self, key: &RepoPath) -> Result<ContentRecord> {
        let reader = self
            .store
            .open(key)
            .map_err(|e| SyncError::remote_error(key.as_str(), e))?;
        serde_json::from_reader(reader)
            .map_err(|e| SyncError::validation_error(key.as_str(), e.to_string()))
    }

    /// Upload `content` compressed and write its record.
    ///
    /// The digest is taken from the very bytes streamed into the compressor,
    /// never from a second read of the source.
    #[instrument(skip_all, fields(path = %path))]
    pub fn write_record(
        &self,
        path: &RepoPath,
        content: impl Read,
        editor: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<ContentRecord> {
        let content_key = self.content_key(path);
        let meta_key = self.meta_key(path);

        for key in [&content_key, &meta_key] {
            if let Some(parent) = key.parent() {
                self.ensure_dir(&parent)?;
            }
        }

        let hash = self.upload_blob(path, &content_key, content)?;

        let record = ContentRecord {
            hash,
            last_editor: editor.to_string(),
            last_edit: edited_at,
        };

        let remote_err = |e| SyncError::remote_error(meta_key.as_str(), e);
        let mut writer = self.store.create(&meta_key).map_err(remote_err)?;
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n").map_err(remote_err)?;
        writer.flush().map_err(remote_err)?;

        debug!(hash = %record.hash, "record written");
        Ok(record)
    }

    fn upload_blob(
        &self,
        path: &RepoPath,
        content_key: &RepoPath,
        mut content: impl Read,
    ) -> Result<ContentHash> {
        let remote_err = |e| SyncError::remote_error(content_key.as_str(), e);

        let blob = self.store.create(content_key).map_err(remote_err)?;
        let mut writer = HashingWriter::new(GzEncoder::new(blob, Compression::best()));
        let mut buffer = vec![0; BUFFER_SIZE];

        loop {
            let bytes_read = content
                .read(&mut buffer)
                .map_err(|e| SyncError::io_error(path.to_native(), e))?;
            if bytes_read == 0 {
                break;
            }
            writer.write_all(&buffer[..bytes_read]).map_err(remote_err)?;
        }

        let uncompressed = writer.bytes_written();
        let (encoder, hash) = writer.finish();
        let mut blob = encoder.finish().map_err(remote_err)?;
        blob.flush().map_err(remote_err)?;
        debug!(key = %content_key, bytes = uncompressed, "blob uploaded");
        Ok(hash)
    }

    /// Delete the record, then the blob. A missing half is an error.
    #[instrument(skip_all, fields(path = %path))]
    pub fn remove_record(&self, path: &RepoPath) -> Result<()> {
        for key in [self.meta_key(path), self.content_key(path)] {
            self.store
                .remove(&key)
                .map_err(|e| SyncError::remote_error(key.as_str(), e))?;
        }
        debug!("record removed");
        Ok(())
    }

    /// Decompress the blob for `path` into `out`, checking it against the record
    pub fn download(&self, path: &RepoPath, out: impl Write) -> Result<ContentRecord> {
        let record = self.read_record(path)?;
        let content_key = self.content_key(path);
        let remote_err = |e| SyncError::remote_error(content_key.as_str(), e);

        let blob = self.store.open(&content_key).map_err(remote_err)?;
        let mut decoder = GzDecoder::new(blob);
        let mut writer = HashingWriter::new(out);
        io::copy(&mut decoder, &mut writer).map_err(remote_err)?;
        writer.flush().map_err(remote_err)?;

        let (_, hash) = writer.finish();
        if hash != record.hash {
            return Err(SyncError::validation_error(
                content_key.as_str(),
                format!("content hash {} does not match record {}", hash, record.hash),
            ));
        }
        Ok(record)
    }

    /// Lazily list every record under `<root>/meta`.
    ///
    /// Paths matched by `matcher` are skipped and ignored directories are not
    /// descended into. Records whose blob is missing are not yielded.
    pub fn list_records<'a>(&'a self, matcher: Option<&'a IgnoreMatcher>) -> RecordIter<'a> {
        let meta_root = self.root.join(META_DIR);
        RecordIter {
            records: self,
            walker: RemoteWalker::new(self.store.as_ref(), meta_root.clone()),
            meta_root,
            matcher,
            started: false,
        }
    }

    fn ensure_dir(&self, dir: &RepoPath) -> Result<()> {
        match self.store.mkdir_all(dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(SyncError::remote_error(dir.as_str(), e)),
        }
    }
}

/// Iterator returned by [`RecordStore::list_records`]
pub struct RecordIter<'a> {
    records: &'a RecordStore,
    walker: RemoteWalker<'a>,
    meta_root: RepoPath,
    matcher: Option<&'a IgnoreMatcher>,
    started: bool,
}

impl Iterator for RecordIter<'_> {
    type Item = Result<(RepoPath, ContentRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                // no meta directory yet means no records
                Err(e) if !self.started && e.kind() == io::ErrorKind::NotFound => return None,
                Err(e) => {
                    return Some(Err(SyncError::remote_error(self.meta_root.as_str(), e)))
                }
            };

            if !self.started {
                self.started = true;
                continue;
            }

            let path = match entry.path.relative_to(&self.meta_root) {
                Ok(path) => path,
                Err(e) => return Some(Err(e)),
            };

            if let Some(matcher) = self.matcher {
                if matcher.is_ignored(&path, entry.is_dir()) {
                    if entry.is_dir() {
                        self.walker.skip_current_dir();
                    }
                    continue;
                }
            }
            if entry.is_dir() {
                continue;
            }

            match self.records.exists(&path) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(path = %path, "record without content blob, treating as absent");
                    continue;
                }
                Err(e) => return Some(Err(e)),
            }

            return Some(self.records.read_meta(&entry.path).map(|record| (path, record)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryStore;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn setup() -> (MemoryStore, RecordStore) {
        let memory = MemoryStore::new();
        let records = RecordStore::connect(Arc::new(memory.clone()), RepoPath::new("/srv/project"))
            .unwrap();
        (memory, records)
    }

    fn edited_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_layout_keys() {
        let (_, records) = setup();
        let path = RepoPath::new("docs/a.txt");
        assert_eq!(records.meta_key(&path).as_str(), "/srv/project/meta/docs/a.txt");
        assert_eq!(
            records.content_key(&path).as_str(),
            "/srv/project/content/docs/a.txt.gz"
        );
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let (memory, records) = setup();
        let path = RepoPath::new("docs/a.txt");
        let content = b"hello remote world".repeat(100);

        let written = records
            .write_record(&path, Cursor::new(content.clone()), "alice", edited_at())
            .unwrap();
        assert_eq!(written.hash, ContentHash::of(&content));

        let read = records.read_record(&path).unwrap();
        assert_eq!(read, written);
        assert_eq!(read.last_editor, "alice");

        let blob = memory.read_file("/srv/project/content/docs/a.txt.gz").unwrap();
        assert!(blob.len() < content.len());

        let mut restored = Vec::new();
        records.download(&path, &mut restored).unwrap();
        assert_eq!(restored, content);
    }

    #[test]
    fn test_record_json_layout() {
        let (memory, records) = setup();
        let path = RepoPath::new("a.txt");
        records
            .write_record(&path, Cursor::new(b"x".to_vec()), "bob", edited_at())
            .unwrap();

        let raw = memory.read_file("/srv/project/meta/a.txt").unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["last_editor"], "bob");
        assert!(json["hash"].is_string());
        assert!(json["last_edit"].as_str().unwrap().starts_with("2024-03-01T12:00:00"));
    }

    #[test]
    fn test_exists_requires_both_halves() {
        let (memory, records) = setup();
        let path = RepoPath::new("a.txt");
        records
            .write_record(&path, Cursor::new(b"x".to_vec()), "bob", edited_at())
            .unwrap();
        assert!(records.exists(&path).unwrap());

        memory
            .remove(&RepoPath::new("/srv/project/content/a.txt.gz"))
            .unwrap();
        assert!(!records.exists(&path).unwrap());

        let err = records.read_record(&path).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_malformed_record_is_validation_error() {
        let (memory, records) = setup();
        memory.insert_file("/srv/project/content/bad.txt.gz", "blob");
        memory.insert_file("/srv/project/meta/bad.txt", "{not json");

        let err = records.read_record(&RepoPath::new("bad.txt")).unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
    }

    #[test]
    fn test_remove_record_requires_both_halves() {
        let (memory, records) = setup();
        let path = RepoPath::new("a.txt");
        records
            .write_record(&path, Cursor::new(b"x".to_vec()), "bob", edited_at())
            .unwrap();

        records.remove_record(&path).unwrap();
        assert!(!memory.contains_file("/srv/project/meta/a.txt"));
        assert!(!memory.contains_file("/srv/project/content/a.txt.gz"));

        let err = records.remove_record(&path).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_ignore_publish_and_read() {
        let (_, records) = setup();
        assert_eq!(records.read_ignore().unwrap(), None);
        assert!(records.is_empty().unwrap());

        records.publish_ignore("*.log\n").unwrap();
        assert_eq!(records.read_ignore().unwrap().as_deref(), Some("*.log\n"));
        assert!(!records.is_empty().unwrap());
    }

    #[test]
    fn test_list_records_filters_and_skips_orphans() {
        let (memory, records) = setup();
        for name in ["a.txt", "logs/run.log", "src/lib.rs", "orphan.txt"] {
            records
                .write_record(
                    &RepoPath::new(name),
                    Cursor::new(name.as_bytes().to_vec()),
                    "bob",
                    edited_at(),
                )
                .unwrap();
        }
        memory
            .remove(&RepoPath::new("/srv/project/content/orphan.txt.gz"))
            .unwrap();

        let matcher = IgnoreMatcher::new("logs/").unwrap();
        let listed: Vec<String> = records
            .list_records(Some(&matcher))
            .map(|r| r.unwrap().0.to_string())
            .collect();

        assert_eq!(listed, vec!["a.txt", "src/lib.rs"]);
    }

    #[test]
    fn test_list_records_without_meta_dir_is_empty() {
        let (_, records) = setup();
        assert_eq!(records.list_records(None).count(), 0);
    }

    #[test]
    fn test_download_detects_corrupt_blob() {
        let (memory, records) = setup();
        let path = RepoPath::new("a.txt");
        records
            .write_record(&path, Cursor::new(b"original".to_vec()), "bob", edited_at())
            .unwrap();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"tampered").unwrap();
        memory.insert_file("/srv/project/content/a.txt.gz", encoder.finish().unwrap());

        let err = records.download(&path, io::sink()).unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
    }
}
