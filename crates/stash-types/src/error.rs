use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("unknown key policy: {0}")]
    UnknownKeyPolicy(String),
}
