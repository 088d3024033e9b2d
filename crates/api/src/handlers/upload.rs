//! Upload handler for image overlay assets.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Response for a stored upload. `url` is relative to the server root.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

/// POST /api/upload
///
/// Store the multipart `file` field under the upload directory and return
/// the path it is served from. Other fields are ignored.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .and_then(sanitize_file_name)
            .ok_or_else(|| AppError::BadRequest("Uploaded file has no usable name".into()))?;

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let dir = &state.config.upload_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to create upload dir: {e}")))?;
        tokio::fs::write(dir.join(&file_name), &data)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to store {file_name}: {e}")))?;

        tracing::info!(file = %file_name, size = data.len(), "File uploaded",);

        return Ok(Json(UploadResponse {
            url: upload_url(&file_name),
        }));
    }

    Err(AppError::BadRequest("No file uploaded".into()))
}

/// Path a stored file is served from. The name is percent-encoded so
/// `#`, `?`, `%` and spaces survive URL resolution.
fn upload_url(file_name: &str) -> String {
    format!("/uploads/{}", urlencoding::encode(file_name))
}

/// Reduce a client-supplied name to its last path component.
///
/// Returns `None` for names that would escape or denote the directory.
fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    match name {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_plain_names() {
        assert_eq!(sanitize_file_name("logo.png").as_deref(), Some("logo.png"));
    }

    #[test]
    fn strips_directories() {
        assert_eq!(
            sanitize_file_name("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            sanitize_file_name("C:\\Users\\me\\logo.png").as_deref(),
            Some("logo.png")
        );
    }

    #[test]
    fn upload_url_percent_encodes_the_name() {
        assert_eq!(upload_url("logo.png"), "/uploads/logo.png");
        assert_eq!(
            upload_url("a#b?c 100%.png"),
            "/uploads/a%23b%3Fc%20100%25.png"
        );
    }

    #[test]
    fn rejects_empty_and_dot_names() {
        assert_eq!(sanitize_file_name(""), None);
        assert_eq!(sanitize_file_name("dir/"), None);
        assert_eq!(sanitize_file_name(".."), None);
    }
}
