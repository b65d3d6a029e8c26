//! Foundation types for stash.
//!
//! Every other stash crate depends on `stash-types`. The types here carry the
//! invariants the rest of the system relies on: a [`StorageKey`] can only be
//! built through the sanitizer or the strict parser, so a key that could
//! escape the storage root is unrepresentable.
//!
//! # Key Types
//!
//! - [`StorageKey`]: sanitized, filesystem-safe identifier for one object
//! - [`KeyPolicy`]: how a display name becomes a key (timestamped or original name)
//! - [`KeyAllocator`]: per-store key generator with a strictly increasing clock
//! - [`ObjectMetadata`]: untrusted, client-declared name, type and size
//! - [`ObjectEntry`]: one row of a store listing

pub mod error;
pub mod key;
pub mod object;

pub use error::TypeError;
pub use key::{KeyAllocator, KeyPolicy, StorageKey, MAX_KEY_LEN};
pub use object::{
    ObjectEntry, ObjectMetadata, StoredObject, MAX_CONTENT_TYPE_LEN, MAX_DISPLAY_NAME_LEN,
};
