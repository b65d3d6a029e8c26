use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::json;
use stash_store::{ingest, ObjectEntry, ObjectMetadata, ObjectStore, StoreResult, UploadPolicy};

use crate::error::{ServerError, ServerResult};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub policy: Arc<UploadPolicy>,
}

impl AppState {
    pub fn new(store: Arc<dyn ObjectStore>, policy: UploadPolicy) -> Self {
        Self {
            store,
            policy: Arc::new(policy),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub file: String,
    pub metadata: ObjectMetadata,
}

#[derive(Debug, Serialize)]
pub struct FileList {
    pub files: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ObjectList {
    pub files: Vec<ObjectEntry>,
}

/// Run a store call on the blocking pool.
async fn with_store<T, F>(store: &Arc<dyn ObjectStore>, op: F) -> ServerResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn ObjectStore) -> StoreResult<T> + Send + 'static,
{
    let store = Arc::clone(store);
    let result = tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(result?)
}

fn multipart_error(err: MultipartError, policy: &UploadPolicy) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::UploadTooLarge {
            max: policy.max_size,
        }
    } else {
        ServerError::Multipart(err.body_text())
    }
}

/// Health check handler.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": "stash-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Multipart field that carries the upload.
const FILE_FIELD: &str = "file";

/// A file part read into memory.
struct FilePart {
    display_name: String,
    content_type: String,
    data: Vec<u8>,
}

/// Buffer one file part. The declared type is checked before any content
/// is read, and the size limit is enforced chunk by chunk, so an oversized
/// upload is cut off as soon as it crosses the limit.
async fn read_file_part(
    mut field: Field<'_>,
    display_name: String,
    policy: &UploadPolicy,
) -> ServerResult<FilePart> {
    let content_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_owned();
    policy.check_type(&content_type)?;

    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, policy))? {
        policy.check_size((data.len() + chunk.len()) as u64)?;
        data.extend_from_slice(&chunk);
    }
    Ok(FilePart {
        display_name,
        content_type,
        data,
    })
}

/// `POST /upload`: store the file part named `file`.
///
/// A body without a `file` part falls back to its first part that carries
/// a filename. Other parts are ignored.
pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ServerResult<Json<UploadResponse>> {
    let policy = Arc::clone(&state.policy);
    let mut fallback: Option<ServerResult<FilePart>> = None;

    let part = loop {
        let next = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, &policy))?;
        let Some(field) = next else {
            break fallback.ok_or(ServerError::NoFileProvided)??;
        };
        let Some(display_name) = field.file_name().map(str::to_owned) else {
            continue;
        };

        if field.name() == Some(FILE_FIELD) {
            break read_file_part(field, display_name, &policy).await?;
        }
        if fallback.is_none() {
            fallback = Some(read_file_part(field, display_name, &policy).await);
        }
    };

    let store = Arc::clone(&state.store);
    let ingested = tokio::task::spawn_blocking(move || {
        ingest(
            store.as_ref(),
            &policy,
            &part.display_name,
            &part.content_type,
            &part.data,
        )
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))??;

    Ok(Json(UploadResponse {
        message: "File uploaded successfully",
        file: ingested.key.to_string(),
        metadata: ingested.metadata,
    }))
}

/// `GET /files`: keys of all stored objects in arrival order.
pub async fn list_handler(State(state): State<AppState>) -> ServerResult<Json<FileList>> {
    let entries = with_store(&state.store, |store| store.list()).await?;
    Ok(Json(FileList {
        files: entries.into_iter().map(|e| e.key.to_string()).collect(),
    }))
}

/// `GET /objects`: full listing with metadata.
pub async fn objects_handler(State(state): State<AppState>) -> ServerResult<Json<ObjectList>> {
    let files = with_store(&state.store, |store| store.list()).await?;
    Ok(Json(ObjectList { files }))
}

/// `GET /files/:key`: raw bytes, served inline with the stored content type.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ServerResult<Response> {
    let object = with_store(&state.store, move |store| store.get(&key)).await?;
    let content_type = HeaderValue::from_str(&object.metadata.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, HeaderValue::from_static("inline")),
        ],
        object.data,
    )
        .into_response())
}

/// `DELETE /files/:key`.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ServerResult<Json<serde_json::Value>> {
    with_store(&state.store, move |store| store.delete(&key)).await?;
    Ok(Json(json!({ "message": "File deleted successfully" })))
}

/// Anything no route matched, including paths a client failed to normalize.
pub async fn fallback_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "message": "Not found" })))
}
