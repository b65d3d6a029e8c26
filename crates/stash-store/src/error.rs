/// Reasons an upload is refused before it reaches the store.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The upload is larger than the configured limit.
    #[error("file too large: {size} bytes exceeds the {max} byte limit")]
    SizeExceeded { size: u64, max: u64 },

    /// The declared content type is not on the allow-list.
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    /// The leading bytes do not look like the declared content type.
    #[error("file content does not match declared type {declared}")]
    ContentMismatch { declared: String },
}

/// Errors from object store operations.
///
/// I/O variants carry the underlying error for logging. Callers facing a
/// client should report a generic message instead of the `Display` output,
/// which may mention local paths.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object at this key, or the key was not a valid storage key.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The object could not be written to the backing store.
    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// The object exists but could not be removed.
    #[error("delete failed: {0}")]
    DeleteFailed(#[source] std::io::Error),

    /// The backing store could not be read.
    #[error("read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    /// Stored metadata is missing, malformed or could not be encoded.
    #[error("metadata error: {0}")]
    Metadata(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
