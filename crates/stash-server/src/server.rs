use std::sync::Arc;

use stash_store::ObjectStore;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// stash file server.
pub struct StashServer {
    config: ServerConfig,
    state: AppState,
}

impl StashServer {
    /// Open the configured disk store and prepare the service.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let store: Arc<dyn ObjectStore> = Arc::new(config.open_store()?);
        Ok(Self::with_store(config, store))
    }

    /// Serve from an existing store (e.g. an in-memory one).
    pub fn with_store(config: ServerConfig, store: Arc<dyn ObjectStore>) -> Self {
        let state = AppState::new(store, config.policy());
        Self { config, state }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Start serving requests until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            root = %self.config.storage_root.display(),
            key_policy = %self.config.key_policy,
            "stash server listening"
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_store::{InMemoryObjectStore, KeyPolicy};

    #[test]
    fn server_construction() {
        let server = StashServer::with_store(
            ServerConfig::default(),
            Arc::new(InMemoryObjectStore::new()),
        );
        assert_eq!(server.config().bind_addr, "127.0.0.1:5000".parse::<std::net::SocketAddr>().unwrap());
        let _router = server.router();
    }

    #[test]
    fn new_opens_disk_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            storage_root: dir.path().join("uploads"),
            key_policy: KeyPolicy::OriginalName,
            ..Default::default()
        };
        let server = StashServer::new(config).unwrap();
        assert!(dir.path().join("uploads").is_dir());
        assert_eq!(server.state.store.key_policy(), KeyPolicy::OriginalName);
    }
}
