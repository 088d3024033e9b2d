//! REST client for the Overlay Store and Upload Relay.
//!
//! Wraps the backend HTTP API (overlay CRUD under `/api/overlays`, file
//! upload at `/api/upload`) using [`reqwest`].

use async_trait::async_trait;
use overlay_core::overlay::{Overlay, OverlayBody};
use overlay_core::types::OverlayId;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::Deserialize;

use crate::store::{OverlayStore, StoreError, UploadFile, UploadRelay};

/// HTTP client for a single overlay backend.
#[derive(Debug)]
pub struct OverlayStoreApi {
    client: reqwest::Client,
    base_url: Url,
}

/// Response returned by `POST /api/upload`.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    /// Path (or absolute URL) of the stored file.
    pub url: String,
}

impl OverlayStoreApi {
    /// Create a new API client.
    ///
    /// * `base_url` - Backend base address, e.g. `http://localhost:5000`.
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StoreError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { client, base_url })
    }

    /// Backend base address.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a path returned by the upload endpoint against the base
    /// address. Absolute URLs are returned unchanged.
    pub fn resolve(&self, path: &str) -> Result<String, StoreError> {
        self.base_url
            .join(path)
            .map(String::from)
            .map_err(|e| StoreError::InvalidUrl(format!("{path}: {e}")))
    }

    // ---- private helpers ----

    /// Build `{base}/{segments...}`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| StoreError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn overlay_url(&self, id: &OverlayId) -> Result<Url, StoreError> {
        self.endpoint(&["api", "overlays", id.as_str()])
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`StoreError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StoreError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), StoreError> {
        Self::ensure_success(response).await?;
        Ok(())
    }

    fn require_id(overlay: Overlay) -> Result<Overlay, StoreError> {
        if overlay.id.is_none() {
            return Err(StoreError::MissingId);
        }
        Ok(overlay)
    }
}

#[async_trait]
impl OverlayStore for OverlayStoreApi {
    async fn list(&self) -> Result<Vec<Overlay>, StoreError> {
        let response = self
            .client
            .get(self.endpoint(&["api", "overlays"])?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn create(&self, body: &OverlayBody) -> Result<Overlay, StoreError> {
        let response = self
            .client
            .post(self.endpoint(&["api", "overlays"])?)
            .json(body)
            .send()
            .await?;

        let overlay = Self::parse_response(response).await?;
        Self::require_id(overlay)
    }

    async fn update(&self, id: &OverlayId, body: &OverlayBody) -> Result<Overlay, StoreError> {
        let response = self
            .client
            .put(self.overlay_url(id)?)
            .json(body)
            .send()
            .await?;

        let overlay = Self::parse_response(response).await?;
        Self::require_id(overlay)
    }

    async fn delete(&self, id: &OverlayId) -> Result<(), StoreError> {
        let response = self.client.delete(self.overlay_url(id)?).send().await?;

        Self::check_status(response).await
    }
}

#[async_trait]
impl UploadRelay for OverlayStoreApi {
    async fn upload(&self, file: UploadFile) -> Result<String, StoreError> {
        let size = file.bytes.len();
        let file_name = file.file_name.clone();
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(file.mime.as_deref().unwrap_or("application/octet-stream"))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint(&["api", "upload"])?)
            .multipart(form)
            .send()
            .await?;

        let uploaded: UploadResponse = Self::parse_response(response).await?;
        let url = self.resolve(&uploaded.url)?;

        tracing::debug!(file = %file_name, size, url = %url, "File uploaded");

        Ok(url)
    }
}
