//! Collaborator seams consumed by the sync engine.

use async_trait::async_trait;
use overlay_core::overlay::{Overlay, OverlayBody};
use overlay_core::types::OverlayId;

/// Errors from the Overlay Store or Upload Relay.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The HTTP request itself failed (network, DNS, TLS, body decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Overlay store error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A URL could not be built from the configured base address.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A create response carried no store-assigned id.
    #[error("Overlay store returned an overlay without an id")]
    MissingId,

    /// An update response describes a different overlay than the one
    /// sent (changed id or kind).
    #[error("Overlay store returned an unexpected document: {0}")]
    UnexpectedDocument(String),
}

/// CRUD surface of the durable overlay document store.
#[async_trait]
pub trait OverlayStore: Send + Sync {
    /// `GET /api/overlays`
    async fn list(&self) -> Result<Vec<Overlay>, StoreError>;

    /// `POST /api/overlays`. The returned overlay carries its new id.
    async fn create(&self, body: &OverlayBody) -> Result<Overlay, StoreError>;

    /// `PUT /api/overlays/{id}`. Returns the stored canonical document.
    async fn update(&self, id: &OverlayId, body: &OverlayBody) -> Result<Overlay, StoreError>;

    /// `DELETE /api/overlays/{id}`
    async fn delete(&self, id: &OverlayId) -> Result<(), StoreError>;
}

/// A file picked by the operator for an image overlay.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    /// MIME type, e.g. `image/png`. Sent as `application/octet-stream`
    /// when absent.
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: None,
            bytes,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

/// File upload endpoint.
#[async_trait]
pub trait UploadRelay: Send + Sync {
    /// Upload `file` and return the absolute URL to embed as image
    /// overlay content.
    async fn upload(&self, file: UploadFile) -> Result<String, StoreError>;
}
