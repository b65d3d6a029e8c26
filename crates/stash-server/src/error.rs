use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use stash_store::{IngestError, PolicyError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("No file uploaded")]
    NoFileProvided,

    #[error("file too large: upload exceeds the {max} byte limit")]
    UploadTooLarge { max: u64 },

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("malformed upload: {0}")]
    Multipart(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl From<IngestError> for ServerError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Policy(e) => Self::Policy(e),
            IngestError::Store(e) => Self::Store(e),
        }
    }
}

impl ServerError {
    /// HTTP status for this error. The same kind always maps to the same code.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoFileProvided
            | Self::UploadTooLarge { .. }
            | Self::Policy(_)
            | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show a client. Server-side faults get a fixed
    /// message so local paths and I/O details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Store(StoreError::NotFound(_)) => "File not found".into(),
            Self::Store(StoreError::WriteFailed(_)) => "Upload failed".into(),
            Self::Store(StoreError::DeleteFailed(_)) => "Delete failed".into(),
            Self::Store(StoreError::ReadFailed(_)) => "Cannot read files".into(),
            Self::Store(StoreError::Metadata(_)) => "Cannot read file".into(),
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => "Internal server error".into(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        (status, Json(json!({ "message": self.public_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn status_mapping_is_fixed_per_kind() {
        assert_eq!(ServerError::NoFileProvided.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServerError::Policy(PolicyError::UnsupportedType("x/y".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Store(StoreError::NotFound("k".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::Store(StoreError::WriteFailed(io::Error::other("disk full"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn io_details_stay_private() {
        let err = ServerError::Store(StoreError::DeleteFailed(io::Error::other(
            "/srv/uploads/x: permission denied",
        )));
        assert_eq!(err.public_message(), "Delete failed");
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn policy_messages_are_shown() {
        let err = ServerError::from(IngestError::Policy(PolicyError::SizeExceeded {
            size: 10,
            max: 5,
        }));
        assert!(err.public_message().contains("too large"));
        assert_eq!(ServerError::NoFileProvided.public_message(), "No file uploaded");
    }
}
