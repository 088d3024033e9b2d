//! Overlay validation rules.
//!
//! Pure functions shared by the sync engine (bounded by the rendered
//! frame) and the store server (unbounded). Nothing here has side effects.

use validator::ValidateUrl;

use crate::error::ValidationError;
use crate::overlay::{
    ContentPatch, FrameBounds, Geometry, GeometryPatch, Overlay, OverlayKind,
};

/// URL schemes accepted for image overlay content.
pub const IMAGE_URL_SCHEMES: &[&str] = &["http://", "https://"];

/// Validate `content` for an overlay of the given kind.
///
/// Text must be non-empty after trimming; image content must be an
/// absolute http(s) URL.
pub fn validate_content(kind: OverlayKind, content: &str) -> Result<(), ValidationError> {
    match kind {
        OverlayKind::Text => {
            if content.trim().is_empty() {
                return Err(ValidationError::new("content", "text must not be empty"));
            }
        }
        OverlayKind::Image => {
            let url = content.to_string();
            let has_scheme = IMAGE_URL_SCHEMES.iter().any(|s| url.starts_with(s));
            if !has_scheme || !url.validate_url() {
                return Err(ValidationError::new(
                    "content",
                    format!("'{content}' is not a well-formed image URL"),
                ));
            }
        }
    }
    Ok(())
}

/// Validate geometry against the frame.
///
/// `x`/`y` must be non-negative and inside the frame (an overlay whose
/// top-left corner lies past the right or bottom edge is fully outside).
/// `width`/`height` must be positive and no larger than the frame.
pub fn validate_geometry(geometry: &Geometry, bounds: &FrameBounds) -> Result<(), ValidationError> {
    let Geometry {
        x,
        y,
        width,
        height,
    } = *geometry;

    if x < 0 {
        return Err(ValidationError::new("x", format!("must be >= 0, got {x}")));
    }
    if y < 0 {
        return Err(ValidationError::new("y", format!("must be >= 0, got {y}")));
    }
    if width <= 0 {
        return Err(ValidationError::new(
            "width",
            format!("must be > 0, got {width}"),
        ));
    }
    if height <= 0 {
        return Err(ValidationError::new(
            "height",
            format!("must be > 0, got {height}"),
        ));
    }
    if x >= bounds.width {
        return Err(ValidationError::new(
            "x",
            format!("{x} is outside the {}px wide frame", bounds.width),
        ));
    }
    if y >= bounds.height {
        return Err(ValidationError::new(
            "y",
            format!("{y} is outside the {}px high frame", bounds.height),
        ));
    }
    if width > bounds.width {
        return Err(ValidationError::new(
            "width",
            format!("{width} exceeds the frame width {}", bounds.width),
        ));
    }
    if height > bounds.height {
        return Err(ValidationError::new(
            "height",
            format!("{height} exceeds the frame height {}", bounds.height),
        ));
    }
    Ok(())
}

/// Validate the inputs of a new overlay and build it (no id, not pending).
pub fn validate_create(
    kind: OverlayKind,
    content: impl Into<String>,
    geometry: Geometry,
    bounds: &FrameBounds,
) -> Result<Overlay, ValidationError> {
    let content = content.into();
    validate_content(kind, &content)?;
    validate_geometry(&geometry, bounds)?;

    Ok(Overlay {
        id: None,
        kind,
        content,
        geometry,
        pending: false,
    })
}

/// Validate a geometry change for an existing overlay.
pub fn validate_geometry_update(
    _overlay: &Overlay,
    geometry: Geometry,
    bounds: &FrameBounds,
) -> Result<GeometryPatch, ValidationError> {
    validate_geometry(&geometry, bounds)?;
    Ok(GeometryPatch { geometry })
}

/// Validate a content change. Only text overlays are editable in place.
pub fn validate_content_update(
    overlay: &Overlay,
    content: impl Into<String>,
) -> Result<ContentPatch, ValidationError> {
    if overlay.kind != OverlayKind::Text {
        return Err(ValidationError::new(
            "content",
            format!("{} overlays cannot be edited in place", overlay.kind),
        ));
    }
    let content = content.into();
    validate_content(overlay.kind, &content)?;
    Ok(ContentPatch { content })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn frame() -> FrameBounds {
        FrameBounds::default()
    }

    fn text_overlay() -> Overlay {
        validate_create(
            OverlayKind::Text,
            "Hello",
            Geometry::new(50, 50, 200, 50),
            &frame(),
        )
        .unwrap()
    }

    #[test]
    fn create_builds_unpersisted_overlay() {
        let overlay = text_overlay();
        assert_eq!(overlay.id, None);
        assert!(!overlay.pending);
        assert_eq!(overlay.content, "Hello");
        assert_eq!(overlay.geometry, Geometry::new(50, 50, 200, 50));
    }

    #[test]
    fn create_rejects_blank_text() {
        let err = validate_create(OverlayKind::Text, "   ", Geometry::new(0, 0, 10, 10), &frame())
            .unwrap_err();
        assert_eq!(err.field, "content");
    }

    #[test]
    fn create_rejects_malformed_image_url() {
        for bad in ["", "logo.png", "/uploads/logo.png", "http://", "ftp://host/a.png"] {
            let result =
                validate_create(OverlayKind::Image, bad, Geometry::new(0, 0, 10, 10), &frame());
            assert_matches!(result, Err(ValidationError { field: "content", .. }), "{bad}");
        }
    }

    #[test]
    fn create_accepts_http_image_url() {
        let overlay = validate_create(
            OverlayKind::Image,
            "http://localhost:5000/uploads/logo.png",
            Geometry::new(50, 50, 100, 100),
            &frame(),
        )
        .unwrap();
        assert_eq!(overlay.kind, OverlayKind::Image);
    }

    #[test]
    fn geometry_rejects_negative_position_and_non_positive_size() {
        let overlay = text_overlay();
        let cases = [
            (Geometry::new(-1, 0, 10, 10), "x"),
            (Geometry::new(0, -1, 10, 10), "y"),
            (Geometry::new(0, 0, 0, 10), "width"),
            (Geometry::new(0, 0, 10, 0), "height"),
            (Geometry::new(0, 0, -5, 10), "width"),
        ];
        for (geometry, field) in cases {
            let err = validate_geometry_update(&overlay, geometry, &frame()).unwrap_err();
            assert_eq!(err.field, field, "{geometry:?}");
        }
    }

    #[test]
    fn geometry_rejects_overlay_fully_outside_frame() {
        let overlay = text_overlay();
        assert!(validate_geometry_update(&overlay, Geometry::new(640, 10, 10, 10), &frame()).is_err());
        assert!(validate_geometry_update(&overlay, Geometry::new(10, 360, 10, 10), &frame()).is_err());
        assert!(validate_geometry_update(&overlay, Geometry::new(639, 359, 10, 10), &frame()).is_ok());
    }

    #[test]
    fn geometry_rejects_size_larger_than_frame() {
        let overlay = text_overlay();
        assert!(validate_geometry_update(&overlay, Geometry::new(0, 0, 641, 10), &frame()).is_err());
        assert!(validate_geometry_update(&overlay, Geometry::new(0, 0, 10, 361), &frame()).is_err());
        assert!(validate_geometry_update(&overlay, Geometry::new(0, 0, 640, 360), &frame()).is_ok());
    }

    #[test]
    fn unbounded_frame_only_checks_signs() {
        let g = Geometry::new(10_000, 10_000, 5_000, 5_000);
        assert!(validate_geometry(&g, &FrameBounds::unbounded()).is_ok());
        assert!(validate_geometry(&Geometry::new(-1, 0, 1, 1), &FrameBounds::unbounded()).is_err());
    }

    #[test]
    fn geometry_update_returns_patch_only() {
        let overlay = text_overlay();
        let patch =
            validate_geometry_update(&overlay, Geometry::new(80, 60, 200, 50), &frame()).unwrap();
        assert_eq!(patch.geometry, Geometry::new(80, 60, 200, 50));
    }

    #[test]
    fn content_update_rejected_for_images() {
        let image = validate_create(
            OverlayKind::Image,
            "https://cdn.example/a.png",
            Geometry::new(0, 0, 10, 10),
            &frame(),
        )
        .unwrap();
        let err = validate_content_update(&image, "https://cdn.example/b.png").unwrap_err();
        assert!(err.reason.contains("image"));
    }

    #[test]
    fn content_update_rejects_blank_text() {
        let overlay = text_overlay();
        assert!(validate_content_update(&overlay, "").is_err());
        assert_eq!(
            validate_content_update(&overlay, "World").unwrap().content,
            "World"
        );
    }
}
