use std::collections::BTreeMap;
use std::io::Read;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use stash_types::{
    KeyAllocator, KeyPolicy, ObjectEntry, ObjectMetadata, StorageKey, StoredObject,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{resolve_key, ObjectStore};

struct MemoryObject {
    metadata: ObjectMetadata,
    data: Vec<u8>,
    stored_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<StorageKey, MemoryObject>,
    next_seq: u64,
}

/// In-memory, map-based object store.
///
/// Intended for tests and embedding. All objects are held behind a `RwLock`;
/// a put becomes visible in one step when the write lock is released.
pub struct InMemoryObjectStore {
    allocator: KeyAllocator,
    state: RwLock<MemoryState>,
}

impl InMemoryObjectStore {
    /// Create a new empty store using the default key policy.
    pub fn new() -> Self {
        Self::with_policy(KeyPolicy::default())
    }

    pub fn with_policy(policy: KeyPolicy) -> Self {
        Self {
            allocator: KeyAllocator::new(policy),
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").objects.len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(&self, metadata: &ObjectMetadata, content: &mut dyn Read) -> StoreResult<StorageKey> {
        let mut data = Vec::new();
        content.read_to_end(&mut data).map_err(StoreError::WriteFailed)?;

        let key = self.allocator.allocate(&metadata.display_name);
        let metadata = ObjectMetadata {
            size_bytes: data.len() as u64,
            ..metadata.bounded()
        };

        let mut state = self.state.write().expect("lock poisoned");
        let seq = state.next_seq;
        state.next_seq += 1;
        state.objects.insert(
            key.clone(),
            MemoryObject {
                metadata,
                data,
                stored_at: Utc::now(),
                seq,
            },
        );
        Ok(key)
    }

    fn get(&self, key: &str) -> StoreResult<StoredObject> {
        let key = resolve_key(key)?;
        let state = self.state.read().expect("lock poisoned");
        let obj = state
            .objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(StoredObject {
            key: key.clone(),
            metadata: obj.metadata.clone(),
            data: obj.data.clone(),
        })
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let key = resolve_key(key)?;
        let mut state = self.state.write().expect("lock poisoned");
        match state.objects.remove(&key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    fn list(&self) -> StoreResult<Vec<ObjectEntry>> {
        let state = self.state.read().expect("lock poisoned");
        let mut rows: Vec<(u64, ObjectEntry)> = state
            .objects
            .iter()
            .map(|(key, obj)| {
                (
                    obj.seq,
                    ObjectEntry::new(key.clone(), obj.metadata.clone(), obj.stored_at),
                )
            })
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, entry)| entry).collect())
    }

    fn key_policy(&self) -> KeyPolicy {
        self.allocator.policy()
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        let key = match StorageKey::parse(key) {
            Ok(key) => key,
            Err(_) => return Ok(false),
        };
        Ok(self
            .state
            .read()
            .expect("lock poisoned")
            .objects
            .contains_key(&key))
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("key_policy", &self.allocator.policy())
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put_bytes(store: &InMemoryObjectStore, name: &str, data: &[u8]) -> StorageKey {
        let meta = ObjectMetadata::new(name, "text/plain", data.len() as u64);
        store.put(&meta, &mut &data[..]).unwrap()
    }

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get() {
        let store = InMemoryObjectStore::new();
        let key = put_bytes(&store, "hello.txt", b"hello world");
        let obj = store.get(key.as_str()).unwrap();
        assert_eq!(obj.data, b"hello world");
        assert_eq!(obj.metadata.display_name, "hello.txt");
        assert_eq!(obj.metadata.size_bytes, 11);
    }

    #[test]
    fn recorded_size_is_actual_length() {
        let store = InMemoryObjectStore::new();
        let meta = ObjectMetadata::new("lie.txt", "text/plain", 999);
        let key = store.put(&meta, &mut &b"abc"[..]).unwrap();
        assert_eq!(store.get(key.as_str()).unwrap().metadata.size_bytes, 3);
    }

    #[test]
    fn delete_twice_is_not_found() {
        let store = InMemoryObjectStore::new();
        let key = put_bytes(&store, "gone.txt", b"x");
        store.delete(key.as_str()).unwrap();
        assert!(matches!(store.delete(key.as_str()), Err(StoreError::NotFound(_))));
        assert!(matches!(store.get(key.as_str()), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn traversal_keys_are_not_found() {
        let store = InMemoryObjectStore::with_policy(KeyPolicy::OriginalName);
        put_bytes(&store, "passwd", b"not really");
        assert!(matches!(store.get("../../etc/passwd"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete("../passwd"), Err(StoreError::NotFound(_))));
        assert!(!store.exists("../passwd").unwrap());
        assert!(store.exists("passwd").unwrap());
    }

    // -----------------------------------------------------------------------
    // Key policies
    // -----------------------------------------------------------------------

    #[test]
    fn timestamped_keeps_both_uploads() {
        let store = InMemoryObjectStore::new();
        let a = put_bytes(&store, "same.txt", b"first");
        let b = put_bytes(&store, "same.txt", b"second");
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(a.as_str()).unwrap().data, b"first");
    }

    #[test]
    fn original_name_overwrites() {
        let store = InMemoryObjectStore::with_policy(KeyPolicy::OriginalName);
        let a = put_bytes(&store, "same.txt", b"first");
        let b = put_bytes(&store, "same.txt", b"second");
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(a.as_str()).unwrap().data, b"second");
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    #[test]
    fn list_is_arrival_order() {
        let store = InMemoryObjectStore::with_policy(KeyPolicy::OriginalName);
        put_bytes(&store, "zebra.txt", b"1");
        put_bytes(&store, "alpha.txt", b"2");
        put_bytes(&store, "middle.txt", b"3");
        let names: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|e| e.key.to_string())
            .collect();
        assert_eq!(names, ["zebra.txt", "alpha.txt", "middle.txt"]);
    }

    #[test]
    fn list_counts_puts_minus_deletes() {
        let store = InMemoryObjectStore::new();
        let keys: Vec<_> = (0..7).map(|i| put_bytes(&store, &format!("f{i}.txt"), b"x")).collect();
        for key in &keys[..3] {
            store.delete(key.as_str()).unwrap();
        }
        assert_eq!(store.list().unwrap().len(), 4);
    }

    #[test]
    fn len_and_debug() {
        let store = InMemoryObjectStore::default();
        assert!(store.is_empty());
        put_bytes(&store, "a", b"12345");
        put_bytes(&store, "b", b"123456789");
        assert_eq!(store.len(), 2);
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryObjectStore"));
        assert!(debug.contains("object_count"));
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_same_key_writes_leave_one_whole_object() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryObjectStore::with_policy(KeyPolicy::OriginalName));
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let data = vec![i; 4096];
                    let meta = ObjectMetadata::new("shared.bin", "text/plain", 4096);
                    store.put(&meta, &mut &data[..]).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }

        let obj = store.get("shared.bin").unwrap();
        assert_eq!(obj.data.len(), 4096);
        assert!(obj.data.iter().all(|b| *b == obj.data[0]));
    }
}
