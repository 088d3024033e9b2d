pub mod health;
pub mod overlays;
pub mod upload;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /overlays                 list, create
/// /overlays/{id}            update, delete
///
/// /upload                   store an image asset (multipart)
/// ```
pub fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .nest("/overlays", overlays::router())
        .nest("/upload", upload::router(max_upload_bytes))
}
