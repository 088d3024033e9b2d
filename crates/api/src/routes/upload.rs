//! Route definitions for asset upload, mounted at `/api/upload`.

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;

use crate::handlers::upload;
use crate::state::AppState;

/// ```text
/// POST   /                  -> upload_file
/// ```
///
/// Bodies larger than `max_upload_bytes` are rejected with 413.
pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", post(upload::upload_file))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
