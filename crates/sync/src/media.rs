//! HLS stream binding for the player that overlays are drawn over.
//!
//! The manifest URL is fixed at construction. Playback failures are a
//! flag for the UI; they never reach the overlay engine.

use std::sync::atomic::{AtomicBool, Ordering};

use overlay_core::error::ValidationError;

/// Manifest path served by the reference server's HLS folder.
pub const DEFAULT_MANIFEST_PATH: &str = "/hls/stream.m3u8";

#[derive(Debug)]
pub struct MediaBinding {
    manifest_url: String,
    failed: AtomicBool,
}

impl MediaBinding {
    /// Bind to an HLS manifest. Relative paths are accepted; the player
    /// resolves them against the page origin.
    pub fn new(manifest_url: impl Into<String>) -> Result<Self, ValidationError> {
        let manifest_url = manifest_url.into();
        let path = manifest_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim();

        if path.is_empty() {
            return Err(ValidationError::new("manifest_url", "must not be empty"));
        }
        if !path.to_ascii_lowercase().ends_with(".m3u8") {
            return Err(ValidationError::new(
                "manifest_url",
                format!("{manifest_url} is not an HLS manifest (.m3u8)"),
            ));
        }

        Ok(Self {
            manifest_url,
            failed: AtomicBool::new(false),
        })
    }

    pub fn manifest_url(&self) -> &str {
        &self.manifest_url
    }

    /// Record that the player could not play the stream (unsupported
    /// codec, autoplay blocked, network).
    pub fn report_playback_failure(&self, reason: &str) {
        tracing::warn!(manifest = %self.manifest_url, reason, "HLS playback failed");
        self.failed.store(true, Ordering::Relaxed);
    }

    /// Playback (re)started; clears the failure flag.
    pub fn report_playback_started(&self) {
        if self.failed.swap(false, Ordering::Relaxed) {
            tracing::info!(manifest = %self.manifest_url, "HLS playback recovered");
        }
    }

    pub fn playback_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }
}

impl Default for MediaBinding {
    fn default() -> Self {
        Self {
            manifest_url: DEFAULT_MANIFEST_PATH.to_string(),
            failed: AtomicBool::new(false),
        }
    }
}
