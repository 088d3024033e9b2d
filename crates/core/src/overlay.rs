//! Overlay entity model.
//!
//! An [`Overlay`] is a positioned text or image element composited on top
//! of the video. The wire format follows the document store: the id is
//! carried as `_id` and the kind as `type`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::OverlayId;

/// Rendered size of the default video element.
pub const DEFAULT_FRAME_WIDTH: i32 = 640;
pub const DEFAULT_FRAME_HEIGHT: i32 = 360;

/// Variant tag of an overlay. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    Text,
    Image,
}

impl fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayKind::Text => f.write_str("text"),
            OverlayKind::Image => f.write_str("image"),
        }
    }
}

/// Position and size in the video's coordinate space (pixels).
///
/// Signed so that raw pointer math can be represented and rejected by
/// validation rather than wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Same size, moved to `(x, y)`.
    pub const fn moved_to(self, x: i32, y: i32) -> Self {
        Self { x, y, ..self }
    }
}

/// Rendered width/height of the video frame that bounds overlay geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBounds {
    pub width: i32,
    pub height: i32,
}

impl FrameBounds {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Bounds that only enforce non-negativity. Used where the rendered
    /// frame size is unknown (the store server).
    pub const fn unbounded() -> Self {
        Self {
            width: i32::MAX,
            height: i32::MAX,
        }
    }
}

impl Default for FrameBounds {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_WIDTH, DEFAULT_FRAME_HEIGHT)
    }
}

/// The overlay entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlay {
    /// Store-assigned id; `None` until the create round trip completes.
    #[serde(
        rename = "_id",
        alias = "id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<OverlayId>,
    #[serde(rename = "type", alias = "kind")]
    pub kind: OverlayKind,
    pub content: String,
    #[serde(flatten)]
    pub geometry: Geometry,
    /// Local-only: a request for this overlay is queued or in flight.
    #[serde(skip)]
    pub pending: bool,
}

impl Overlay {
    /// Request body for create/update: the overlay minus its id.
    pub fn body(&self) -> OverlayBody {
        OverlayBody {
            kind: self.kind,
            content: self.content.clone(),
            geometry: self.geometry,
        }
    }

    pub fn apply_geometry(&mut self, patch: &GeometryPatch) {
        self.geometry = patch.geometry;
    }

    pub fn apply_content(&mut self, patch: &ContentPatch) {
        self.content.clone_from(&patch.content);
    }
}

/// Overlay document without an id, as sent to `POST`/`PUT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayBody {
    #[serde(rename = "type", alias = "kind")]
    pub kind: OverlayKind,
    pub content: String,
    #[serde(flatten)]
    pub geometry: Geometry,
}

impl OverlayBody {
    /// Attach a store id, producing a confirmed overlay.
    pub fn into_overlay(self, id: OverlayId) -> Overlay {
        Overlay {
            id: Some(id),
            kind: self.kind,
            content: self.content,
            geometry: self.geometry,
            pending: false,
        }
    }
}

/// A validated geometry change. Never touches `kind` or `content`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryPatch {
    pub geometry: Geometry,
}

/// A validated content change for a text overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentPatch {
    pub content: String,
}
