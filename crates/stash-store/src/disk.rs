//! Filesystem-backed object store.
//!
//! Each object is a single file named by its key directly under the store
//! root. The file carries its own metadata so that one rename publishes
//! metadata and content together:
//!
//! ```text
//! [4 bytes: header length (big-endian u32)]
//! [N bytes: header (JSON: display_name, content_type)]
//! [rest:    object content]
//! ```
//!
//! Writes go to a uniquely named hidden temp file in the root, are synced,
//! and are then renamed onto the key. Temp names start with `.`, which no
//! key can, so they never show up in listings or lookups.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use stash_types::{
    KeyAllocator, KeyPolicy, ObjectEntry, ObjectMetadata, StorageKey, StoredObject,
};
use tracing::{debug, error, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{resolve_key, ObjectStore};

/// Prefix of in-flight upload files.
const TEMP_PREFIX: &str = ".upload-";

/// Temp files younger than this may belong to a writer in another process
/// and are left alone when a store is opened.
pub const ORPHAN_GRACE: Duration = Duration::from_secs(60 * 60);

/// Keys tried for one timestamped put before giving up on collisions with
/// writers that share the root but not the key clock.
const MAX_PERSIST_ATTEMPTS: usize = 8;

/// Header size bound; anything larger is treated as corruption.
const MAX_HEADER_LEN: usize = 64 * 1024;

const LEN_PREFIX: u64 = 4;

#[derive(Serialize, Deserialize)]
struct Header {
    display_name: String,
    content_type: String,
}

/// Object store rooted at a local directory it exclusively owns.
pub struct DiskObjectStore {
    root: PathBuf,
    allocator: KeyAllocator,
}

impl DiskObjectStore {
    /// Open a store at `root`, creating the directory if needed.
    ///
    /// Temp files left by uploads interrupted more than [`ORPHAN_GRACE`]
    /// ago are removed, and the key clock is moved past the newest existing
    /// timestamped key.
    pub fn open(root: impl AsRef<Path>, policy: KeyPolicy) -> StoreResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(StoreError::WriteFailed)?;
        let root = root.canonicalize().map_err(StoreError::ReadFailed)?;

        let store = Self {
            root,
            allocator: KeyAllocator::new(policy),
        };
        store.recover()?;
        info!(root = %store.root.display(), %policy, "opened object store");
        Ok(store)
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &StorageKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    fn recover(&self) -> StoreResult<()> {
        let entries = fs::read_dir(&self.root).map_err(StoreError::ReadFailed)?;
        for entry in entries {
            let entry = entry.map_err(StoreError::ReadFailed)?;
            if let Some(key) = entry.file_name().to_str().and_then(|n| StorageKey::parse(n).ok()) {
                self.allocator.observe(&key);
            }
        }
        self.reap_orphans(ORPHAN_GRACE)?;
        Ok(())
    }

    /// Remove upload temp files last modified at least `older_than` ago and
    /// return how many were removed.
    ///
    /// A temp file of a put still in progress, in this process or another
    /// one sharing the root, is only safe to remove once it is older than
    /// any upload can take.
    pub fn reap_orphans(&self, older_than: Duration) -> StoreResult<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        let entries = fs::read_dir(&self.root).map_err(StoreError::ReadFailed)?;
        for entry in entries {
            let entry = entry.map_err(StoreError::ReadFailed)?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(TEMP_PREFIX) {
                continue;
            }

            // A temp file can be persisted or dropped between read_dir and here.
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age < older_than {
                debug!(file = name, ?age, "keeping recent upload temp file");
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    warn!(file = name, ?age, "removed orphaned upload temp file");
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = name, error = %e, "could not remove orphaned temp file"),
            }
        }
        Ok(removed)
    }

    /// Open the regular file behind `key`, or `NotFound`.
    ///
    /// Directories and symlinks under the root are never objects.
    fn open_object(&self, key: &StorageKey) -> StoreResult<File> {
        let path = self.object_path(key);
        let not_found = || StoreError::NotFound(key.to_string());

        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_file() => {}
            Ok(_) => return Err(not_found()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(StoreError::ReadFailed(e)),
        }
        match File::open(&path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(StoreError::ReadFailed(e)),
        }
    }

    fn stored_at(&self, key: &StorageKey, modified: io::Result<std::time::SystemTime>) -> DateTime<Utc> {
        if self.allocator.policy() == KeyPolicy::Timestamped {
            if let Some(stamp) = key.stamp().and_then(|s| i64::try_from(s).ok()) {
                if let Some(at) = Utc.timestamp_millis_opt(stamp).single() {
                    return at;
                }
            }
        }
        modified.map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now())
    }

    /// Stream `content` into a temp file, then publish it under a freshly
    /// allocated key. Returns the key and the number of content bytes.
    fn write_object(
        &self,
        metadata: &ObjectMetadata,
        content: &mut dyn Read,
    ) -> StoreResult<(StorageKey, u64)> {
        // Capped fields keep the header far below MAX_HEADER_LEN even when
        // every character needs a JSON escape.
        let metadata = metadata.bounded();
        let header = serde_json::to_vec(&Header {
            display_name: metadata.display_name.clone(),
            content_type: metadata.content_type,
        })
        .map_err(|e| StoreError::Metadata(e.to_string()))?;

        // Dropping `tmp` on any early return removes the temp file.
        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.root)
            .map_err(StoreError::WriteFailed)?;
        let written = write_framed(tmp.as_file_mut(), &header, content)
            .map_err(StoreError::WriteFailed)?;

        let mut key = self.allocator.allocate(&metadata.display_name);
        if self.allocator.policy() == KeyPolicy::OriginalName {
            tmp.persist(self.object_path(&key))
                .map_err(|e| StoreError::WriteFailed(e.error))?;
            return Ok((key, written));
        }

        let mut attempt = 1;
        loop {
            match tmp.persist_noclobber(self.object_path(&key)) {
                Ok(_) => return Ok((key, written)),
                Err(e)
                    if e.error.kind() == io::ErrorKind::AlreadyExists
                        && attempt < MAX_PERSIST_ATTEMPTS =>
                {
                    warn!(%key, attempt, "key already taken by another writer, reallocating");
                    self.allocator.observe(&key);
                    key = self.allocator.allocate(&metadata.display_name);
                    tmp = e.file;
                    attempt += 1;
                }
                Err(e) => return Err(StoreError::WriteFailed(e.error)),
            }
        }
    }
}

fn write_framed(file: &mut File, header: &[u8], content: &mut dyn Read) -> io::Result<u64> {
    file.write_all(&(header.len() as u32).to_be_bytes())?;
    file.write_all(header)?;
    let written = io::copy(content, file)?;
    file.sync_all()?;
    Ok(written)
}

fn read_header(reader: &mut impl Read) -> StoreResult<(Header, u64)> {
    let corrupt = |e: io::Error| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            StoreError::Metadata("truncated object header".into())
        } else {
            StoreError::ReadFailed(e)
        }
    };

    let mut len = [0u8; 4];
    reader.read_exact(&mut len).map_err(corrupt)?;
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_HEADER_LEN {
        return Err(StoreError::Metadata(format!("object header of {len} bytes")));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(corrupt)?;
    let header =
        serde_json::from_slice(&buf).map_err(|e| StoreError::Metadata(e.to_string()))?;
    Ok((header, LEN_PREFIX + len as u64))
}

impl ObjectStore for DiskObjectStore {
    fn put(&self, metadata: &ObjectMetadata, content: &mut dyn Read) -> StoreResult<StorageKey> {
        match self.write_object(metadata, content) {
            Ok((key, size)) => {
                info!(%key, size, content_type = %metadata.content_type, "stored object");
                Ok(key)
            }
            Err(e) => {
                error!(
                    name = %metadata.display_name.escape_debug(),
                    error = %e,
                    "failed to store object"
                );
                Err(e)
            }
        }
    }

    fn get(&self, key: &str) -> StoreResult<StoredObject> {
        let key = resolve_key(key)?;
        let mut reader = BufReader::new(self.open_object(&key)?);
        let (header, _) = read_header(&mut reader)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(StoreError::ReadFailed)?;
        debug!(%key, size = data.len(), "read object");

        Ok(StoredObject {
            metadata: ObjectMetadata {
                display_name: header.display_name,
                content_type: header.content_type,
                size_bytes: data.len() as u64,
            },
            key,
            data,
        })
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let key = resolve_key(key)?;
        // Confirms the key names a regular file before unlinking.
        drop(self.open_object(&key)?);

        match fs::remove_file(self.object_path(&key)) {
            Ok(()) => {
                info!(%key, "deleted object");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => {
                error!(%key, error = %e, "failed to delete object");
                Err(StoreError::DeleteFailed(e))
            }
        }
    }

    fn list(&self) -> StoreResult<Vec<ObjectEntry>> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            error!(error = %e, "failed to read store root");
            StoreError::ReadFailed(e)
        })?;

        let mut rows = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StoreError::ReadFailed)?;
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(|n| StorageKey::parse(n).ok()) else {
                continue;
            };
            match entry.file_type() {
                Ok(ft) if ft.is_file() => {}
                _ => continue,
            }

            let file = match File::open(entry.path()) {
                Ok(file) => file,
                // Deleted between read_dir and open.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::ReadFailed(e)),
            };
            let file_meta = file.metadata().map_err(StoreError::ReadFailed)?;
            let (header, offset) = match read_header(&mut BufReader::new(file)) {
                Ok(parsed) => parsed,
                Err(StoreError::Metadata(reason)) => {
                    warn!(%key, %reason, "skipping unreadable object");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let stored_at = self.stored_at(&key, file_meta.modified());
            let metadata = ObjectMetadata {
                display_name: header.display_name,
                content_type: header.content_type,
                size_bytes: file_meta.len().saturating_sub(offset),
            };
            rows.push(ObjectEntry::new(key, metadata, stored_at));
        }

        rows.sort_by(|a, b| a.stored_at.cmp(&b.stored_at).then_with(|| a.key.cmp(&b.key)));
        debug!(count = rows.len(), "listed objects");
        Ok(rows)
    }

    fn key_policy(&self) -> KeyPolicy {
        self.allocator.policy()
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let Ok(key) = StorageKey::parse(key) else {
            return Ok(false);
        };
        match self.open_object(&key) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for DiskObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskObjectStore")
            .field("root", &self.root)
            .field("key_policy", &self.allocator.policy())
            .finish()
    }
}
