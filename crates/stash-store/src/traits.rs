use std::io::Read;

use stash_types::{KeyPolicy, ObjectEntry, ObjectMetadata, StorageKey, StoredObject};

use crate::error::{StoreError, StoreResult};

/// Owner of a namespace of stored objects.
///
/// All implementations must satisfy these invariants:
/// - Keys are allocated by the store from the display name according to its
///   [`KeyPolicy`]; a client never chooses the key of a write.
/// - Read-path keys go through [`StorageKey::parse`] before anything else;
///   a key that is not already in sanitized form is `NotFound`.
/// - A put is atomic: readers see either the complete object or nothing.
/// - Objects are immutable until deleted. Under
///   [`KeyPolicy::OriginalName`] a put to an existing key replaces the old
///   object in one step.
/// - `list` reflects the store at call time and never includes anything
///   outside the namespace (temp files, directories, symlinks).
pub trait ObjectStore: Send + Sync {
    /// Store the bytes read from `content` and return the allocated key.
    ///
    /// The recorded size is the number of bytes actually read, not the
    /// declared `metadata.size_bytes`.
    fn put(&self, metadata: &ObjectMetadata, content: &mut dyn Read) -> StoreResult<StorageKey>;

    /// Fetch an object by raw key.
    fn get(&self, key: &str) -> StoreResult<StoredObject>;

    /// Remove an object. A missing key is `NotFound`, so a second delete of
    /// the same key fails.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Current objects in arrival order.
    fn list(&self) -> StoreResult<Vec<ObjectEntry>>;

    /// The key policy this store allocates with.
    fn key_policy(&self) -> KeyPolicy;

    /// Check whether an object exists.
    ///
    /// Default implementation calls `get()`. Backends may override to avoid
    /// reading the content.
    fn exists(&self, key: &str) -> StoreResult<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Parse a read-path key, failing closed with `NotFound`.
pub(crate) fn resolve_key(raw: &str) -> StoreResult<StorageKey> {
    StorageKey::parse(raw).map_err(|_| {
        tracing::warn!(key = %raw.escape_debug(), "rejected unsanitized storage key");
        StoreError::NotFound(raw.to_owned())
    })
}
