use std::sync::Arc;

use crate::config::ServerConfig;
use crate::repo::OverlayRepo;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Overlay document store.
    pub repo: Arc<OverlayRepo>,
    /// Server configuration (upload/HLS folders, limits).
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Fresh state with an empty overlay store.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            repo: Arc::new(OverlayRepo::new()),
            config: Arc::new(config),
        }
    }
}
