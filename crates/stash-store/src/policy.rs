use crate::error::PolicyError;

/// Default upload limit: 5 MiB.
pub const DEFAULT_MAX_SIZE: u64 = 5 * 1024 * 1024;

/// Images, PDF, plain text, Word/Excel documents, mp4 and webm video.
pub const STANDARD_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
    "video/mp4",
    "video/webm",
];

/// Images, PDF and plain text only.
pub const MINIMAL_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "application/pdf",
    "text/plain",
];

/// Size and content-type rules applied to every upload before it is stored.
///
/// `check` only looks at declared metadata and never at content. Content
/// sniffing is a separate step gated by `sniff_content`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Largest accepted upload in bytes (inclusive).
    pub max_size: u64,
    /// Accepted MIME essences (`type/subtype`, lowercase).
    pub allowed_types: Vec<String>,
    /// Whether uploads are also checked against known magic numbers.
    pub sniff_content: bool,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl UploadPolicy {
    /// Build a policy from a limit and an allow-list.
    pub fn new<I, S>(max_size: u64, allowed_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            max_size,
            allowed_types: allowed_types
                .into_iter()
                .map(|t| essence(t.as_ref()))
                .filter(|t| !t.is_empty())
                .collect(),
            sniff_content: true,
        }
    }

    /// The full allow-list with the 5 MiB limit.
    pub fn standard() -> Self {
        Self::new(DEFAULT_MAX_SIZE, STANDARD_TYPES)
    }

    /// Images, PDF and text with the 5 MiB limit.
    pub fn minimal() -> Self {
        Self::new(DEFAULT_MAX_SIZE, MINIMAL_TYPES)
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_sniffing(mut self, sniff_content: bool) -> Self {
        self.sniff_content = sniff_content;
        self
    }

    /// Decide whether an upload of `size_bytes` declared as `content_type`
    /// may be stored. Size is checked first, so an oversized upload is
    /// `SizeExceeded` whatever its type.
    pub fn check(&self, size_bytes: u64, content_type: &str) -> Result<(), PolicyError> {
        self.check_size(size_bytes)?;
        self.check_type(content_type)
    }

    pub fn check_size(&self, size_bytes: u64) -> Result<(), PolicyError> {
        if size_bytes > self.max_size {
            return Err(PolicyError::SizeExceeded {
                size: size_bytes,
                max: self.max_size,
            });
        }
        Ok(())
    }

    pub fn check_type(&self, content_type: &str) -> Result<(), PolicyError> {
        if self.is_allowed(content_type) {
            Ok(())
        } else {
            Err(PolicyError::UnsupportedType(content_type.trim().to_owned()))
        }
    }

    /// Whether the essence of `content_type` is on the allow-list.
    pub fn is_allowed(&self, content_type: &str) -> bool {
        let wanted = essence(content_type);
        !wanted.is_empty() && self.allowed_types.iter().any(|t| *t == wanted)
    }
}

/// The `type/subtype` part of a MIME value, lowercased, without parameters.
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}
