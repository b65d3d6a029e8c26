use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Room for multipart boundaries and part headers on top of the file limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the axum router with all stash endpoints.
pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.policy.max_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(handler::health_handler))
        .route("/upload", post(handler::upload_handler))
        .route("/files", get(handler::list_handler))
        .route(
            "/files/:key",
            get(handler::get_handler).delete(handler::delete_handler),
        )
        .route("/objects", get(handler::objects_handler))
        .fallback(handler::fallback_handler)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
