//! Client-side configuration.
//!
//! Plain structs with `Default` impls sized for a 640×360 player.

use std::time::Duration;

use overlay_core::overlay::{FrameBounds, Geometry};

/// Broadcast channel capacity for engine events.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// How long a text field must stay blurred before its content is saved.
pub const DEFAULT_TEXT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Sync engine settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Rendered frame size that bounds overlay geometry.
    pub bounds: FrameBounds,
    /// Capacity of the [`SyncEvent`](crate::SyncEvent) channel. Zero is
    /// raised to one.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bounds: FrameBounds::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Interaction adapter settings.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Debounce window for committing text edits on blur.
    pub text_debounce: Duration,
    /// Initial geometry of overlays created by "add text".
    pub text_placement: Geometry,
    /// Initial geometry of overlays created from an upload.
    pub image_placement: Geometry,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            text_debounce: DEFAULT_TEXT_DEBOUNCE,
            text_placement: Geometry::new(50, 50, 200, 50),
            image_placement: Geometry::new(50, 50, 100, 100),
        }
    }
}
