use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::StorageKey;

/// Longest display name kept with an object, in bytes.
pub const MAX_DISPLAY_NAME_LEN: usize = 1024;

/// Longest declared content type kept with an object, in bytes.
pub const MAX_CONTENT_TYPE_LEN: usize = 255;

/// Client-declared description of an upload.
///
/// Every field is untrusted: the name is only ever used after passing
/// through [`StorageKey`] sanitization, and the content type is only a
/// claim until the policy (and optionally the sniffer) has looked at it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub display_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

impl ObjectMetadata {
    /// Build metadata from client-supplied values. Overlong names and
    /// content types are cut on a char boundary rather than rejected.
    pub fn new(
        display_name: impl Into<String>,
        content_type: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            display_name: truncated(display_name.into(), MAX_DISPLAY_NAME_LEN),
            content_type: truncated(content_type.into(), MAX_CONTENT_TYPE_LEN),
            size_bytes,
        }
    }

    /// The same metadata with its string fields within the length caps.
    pub fn bounded(&self) -> Self {
        Self::new(
            self.display_name.as_str(),
            self.content_type.as_str(),
            self.size_bytes,
        )
    }
}

fn truncated(mut value: String, limit: usize) -> String {
    if value.len() > limit {
        let mut end = limit;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        value.truncate(end);
    }
    value
}

/// A stored object: key, the metadata it was stored with, and its bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub key: StorageKey,
    pub metadata: ObjectMetadata,
    pub data: Vec<u8>,
}

/// One row of a store listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: StorageKey,
    pub display_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
}

impl ObjectEntry {
    pub fn new(key: StorageKey, metadata: ObjectMetadata, stored_at: DateTime<Utc>) -> Self {
        Self {
            key,
            display_name: metadata.display_name,
            content_type: metadata.content_type,
            size_bytes: metadata.size_bytes,
            stored_at,
        }
    }
}
