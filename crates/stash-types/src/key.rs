use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum length of a storage key in bytes.
pub const MAX_KEY_LEN: usize = 200;

/// Name used when sanitization leaves nothing usable.
const FALLBACK_NAME: &str = "upload";

/// Longest extension (including the dot) kept intact when a name is truncated.
const MAX_EXTENSION_LEN: usize = 16;

/// Width of the zero-padded millisecond stamp in timestamped keys.
const STAMP_WIDTH: usize = 13;

/// Sanitized identifier addressing one stored object.
///
/// A `StorageKey` never contains a path separator, a `..` sequence, a NUL or
/// any other control character, never starts or ends with `.` or a space,
/// and is at most [`MAX_KEY_LEN`] bytes of `[A-Za-z0-9._- ]`. The only ways to
/// obtain one are [`StorageKey::sanitize`] (write path) and
/// [`StorageKey::parse`] (read path), and both go through the same sanitizer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageKey(String);

impl StorageKey {
    /// Map an arbitrary client-supplied name onto a safe key.
    ///
    /// Only the final path component survives; control characters are
    /// dropped, anything outside the key charset becomes `_`, `..` runs
    /// collapse to `.`, and leading/trailing dots and spaces are trimmed.
    /// Overlong names are cut down while keeping a short extension. A name
    /// with nothing left becomes `upload`.
    pub fn sanitize(display_name: &str) -> Self {
        Self(sanitize_name(display_name, MAX_KEY_LEN))
    }

    /// Accept a raw key only if sanitizing it is the identity.
    ///
    /// Anything carrying traversal sequences, separators, control bytes or
    /// foreign characters is rejected rather than repaired, so lookups fail
    /// closed.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        if !raw.is_empty() && sanitize_name(raw, MAX_KEY_LEN) == raw {
            Ok(Self(raw.to_owned()))
        } else {
            Err(TypeError::InvalidKey(raw.to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Millisecond stamp of a timestamped key, if the key has one.
    pub fn stamp(&self) -> Option<u64> {
        let (stamp, rest) = self.0.split_once('-')?;
        if stamp.len() != STAMP_WIDTH || rest.is_empty() {
            return None;
        }
        stamp.parse().ok()
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StorageKey {
    type Error = TypeError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        key.0
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ')
}

fn sanitize_name(raw: &str, limit: usize) -> String {
    let base = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or("");

    // Everything after this point is ASCII, so byte slicing is safe.
    let mut name: String = base
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if is_key_char(c) { c } else { '_' })
        .collect();

    if name.len() > limit {
        name = truncate_keeping_extension(&name, limit);
    }
    while name.contains("..") {
        name = name.replace("..", ".");
    }

    let trimmed = name.trim_matches(|c: char| c == '.' || c == ' ');
    if trimmed.is_empty() {
        FALLBACK_NAME.to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn truncate_keeping_extension(name: &str, limit: usize) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXTENSION_LEN => {
            let ext = &name[dot..];
            let mut out = name[..limit - ext.len()].to_owned();
            out.push_str(ext);
            out
        }
        _ => name[..limit].to_owned(),
    }
}

// ---------------------------------------------------------------------------
// KeyPolicy
// ---------------------------------------------------------------------------

/// How a store turns a display name into a [`StorageKey`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyPolicy {
    /// `<13-digit unix millis>-<sanitized name>`. Unique across puts, and
    /// lexical key order is arrival order.
    #[default]
    Timestamped,
    /// The sanitized name itself. A later put with the same sanitized name
    /// replaces the earlier object (last writer wins).
    OriginalName,
}

impl fmt::Display for KeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamped => write!(f, "timestamped"),
            Self::OriginalName => write!(f, "original-name"),
        }
    }
}

impl FromStr for KeyPolicy {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "timestamped" => Ok(Self::Timestamped),
            "original-name" | "original_name" | "original" => Ok(Self::OriginalName),
            other => Err(TypeError::UnknownKeyPolicy(other.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// KeyAllocator
// ---------------------------------------------------------------------------

/// Generates keys for a single store according to its [`KeyPolicy`].
///
/// Timestamped stamps are strictly increasing per allocator even when the
/// wall clock stalls or steps backwards.
#[derive(Debug)]
pub struct KeyAllocator {
    policy: KeyPolicy,
    last_stamp: AtomicU64,
}

impl KeyAllocator {
    pub fn new(policy: KeyPolicy) -> Self {
        Self {
            policy,
            last_stamp: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> KeyPolicy {
        self.policy
    }

    /// Allocate the key for a new object named `display_name`.
    pub fn allocate(&self, display_name: &str) -> StorageKey {
        match self.policy {
            KeyPolicy::OriginalName => StorageKey::sanitize(display_name),
            KeyPolicy::Timestamped => {
                let stamp = self.next_stamp();
                let name = sanitize_name(display_name, MAX_KEY_LEN - STAMP_WIDTH - 1);
                StorageKey(format!("{stamp:0width$}-{name}", width = STAMP_WIDTH))
            }
        }
    }

    /// Raise the clock floor past an existing key's stamp.
    pub fn observe(&self, key: &StorageKey) {
        if let Some(stamp) = key.stamp() {
            self.last_stamp.fetch_max(stamp, Ordering::AcqRel);
        }
    }

    fn next_stamp(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let mut last = self.last_stamp.load(Ordering::Acquire);
        loop {
            let next = now.max(last + 1);
            match self.last_stamp.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

impl Default for KeyAllocator {
    fn default() -> Self {
        Self::new(KeyPolicy::default())
    }
}
