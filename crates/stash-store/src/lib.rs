//! Storage core for stash.
//!
//! Turns an inbound byte stream into a validated, safely-named, durably
//! stored object, and serves or removes objects by key without ever letting
//! a client-supplied name reach the filesystem unsanitized.
//!
//! # Components
//!
//! - [`UploadPolicy`] -- pure size / content-type check run before any byte is stored
//! - [`sniff`] -- optional check of leading bytes against the declared type
//! - [`ObjectStore`] -- put / get / delete / list over a private namespace
//!
//! # Storage Backends
//!
//! - [`DiskObjectStore`] -- one file per object under a root directory,
//!   written to a temp file and renamed into place
//! - [`InMemoryObjectStore`] -- `BTreeMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Validation happens before the store is touched; a rejected upload
//!    leaves nothing behind.
//! 2. Keys are allocated by the store, never taken verbatim from a client.
//! 3. Read-path keys must already be in sanitized form or the lookup is
//!    `NotFound`.
//! 4. An object is either fully visible at its key or not visible at all.
//! 5. Objects are immutable between put and delete.

pub mod disk;
pub mod error;
pub mod ingest;
pub mod memory;
pub mod policy;
pub mod sniff;
pub mod traits;

pub use disk::DiskObjectStore;
pub use error::{PolicyError, StoreError, StoreResult};
pub use ingest::{ingest, IngestError, Ingested};
pub use memory::InMemoryObjectStore;
pub use policy::{UploadPolicy, DEFAULT_MAX_SIZE};
pub use traits::ObjectStore;

pub use stash_types::{
    KeyPolicy, ObjectEntry, ObjectMetadata, StorageKey, StoredObject, MAX_DISPLAY_NAME_LEN,
};
