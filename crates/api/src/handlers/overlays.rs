//! Handlers for overlay document CRUD.
//!
//! Geometry fields are coerced to integers on the way in (`12.7` and
//! `"12"` are accepted), then the document is checked with the shared
//! validation rules. The frame size is unknown here, so only sign and
//! positivity are enforced.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use overlay_core::error::{CoreError, ValidationError};
use overlay_core::overlay::{FrameBounds, Geometry, Overlay, OverlayBody, OverlayKind};
use overlay_core::types::OverlayId;
use overlay_core::validation;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Create/update request body. Every field is optional so `PUT` can
/// patch a subset; `POST` requires them all.
#[derive(Debug, Default, Deserialize)]
pub struct OverlayPayload {
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: Option<OverlayKind>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "coerce_int")]
    pub x: Option<i32>,
    #[serde(default, deserialize_with = "coerce_int")]
    pub y: Option<i32>,
    #[serde(default, deserialize_with = "coerce_int")]
    pub width: Option<i32>,
    #[serde(default, deserialize_with = "coerce_int")]
    pub height: Option<i32>,
}

impl OverlayPayload {
    /// Build a complete body, failing on the first missing field.
    fn into_body(self) -> AppResult<OverlayBody> {
        fn required<T>(value: Option<T>, field: &str) -> AppResult<T> {
            value.ok_or_else(|| AppError::BadRequest(format!("Missing field '{field}'")))
        }

        Ok(OverlayBody {
            kind: required(self.kind, "type")?,
            content: required(self.content, "content")?,
            geometry: Geometry::new(
                required(self.x, "x")?,
                required(self.y, "y")?,
                required(self.width, "width")?,
                required(self.height, "height")?,
            ),
        })
    }

    /// Overwrite the fields present in the payload.
    ///
    /// The kind never changes, and neither does the content of an image
    /// overlay.
    fn merge_into(self, mut body: OverlayBody) -> Result<OverlayBody, ValidationError> {
        if let Some(kind) = self.kind.filter(|kind| *kind != body.kind) {
            return Err(ValidationError::new(
                "type",
                format!("cannot change a {} overlay into {kind}", body.kind),
            ));
        }
        if let Some(content) = self.content {
            if body.kind == OverlayKind::Image && content != body.content {
                return Err(ValidationError::new(
                    "content",
                    "image content cannot be changed",
                ));
            }
            body.content = content;
        }
        let g = &mut body.geometry;
        g.x = self.x.unwrap_or(g.x);
        g.y = self.y.unwrap_or(g.y);
        g.width = self.width.unwrap_or(g.width);
        g.height = self.height.unwrap_or(g.height);
        Ok(body)
    }
}

/// Accept integers, floats (truncated) and numeric strings.
fn coerce_int<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    let Some(value) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let float = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    float
        .filter(|f| f.is_finite() && *f >= f64::from(i32::MIN) && *f <= f64::from(i32::MAX))
        .map(|f| Some(f.trunc() as i32))
        .ok_or_else(|| D::Error::custom(format!("expected an integer, got {value}")))
}

fn validate(body: &OverlayBody) -> Result<(), CoreError> {
    validation::validate_content(body.kind, &body.content)?;
    validation::validate_geometry(&body.geometry, &FrameBounds::unbounded())?;
    Ok(())
}

/// GET /api/overlays
///
/// List every overlay document in creation order.
pub async fn list_overlays(State(state): State<AppState>) -> Json<Vec<Overlay>> {
    Json(state.repo.list())
}

/// POST /api/overlays
///
/// Create an overlay. Responds 201 with the stored document and its `_id`.
pub async fn create_overlay(
    State(state): State<AppState>,
    Json(payload): Json<OverlayPayload>,
) -> AppResult<(StatusCode, Json<Overlay>)> {
    let body = payload.into_body()?;
    validate(&body)?;

    let overlay = state.repo.create(body);

    if let Some(id) = &overlay.id {
        tracing::info!(overlay_id = %id, kind = %overlay.kind, "Overlay created",);
    }

    Ok((StatusCode::CREATED, Json(overlay)))
}

/// PUT /api/overlays/{id}
///
/// Update the fields present in the body and return the stored document.
pub async fn update_overlay(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<OverlayPayload>,
) -> AppResult<Json<Overlay>> {
    let id = OverlayId::new(id);
    let current = state.repo.find(&id).ok_or_else(|| CoreError::NotFound {
        entity: "Overlay",
        id: id.clone(),
    })?;

    let body = payload
        .merge_into(current.body())
        .map_err(CoreError::from)?;
    validate(&body)?;
    let overlay = state.repo.update(&id, body)?;

    tracing::info!(overlay_id = %id, "Overlay updated",);

    Ok(Json(overlay))
}

/// DELETE /api/overlays/{id}
pub async fn delete_overlay(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = OverlayId::new(id);
    state.repo.delete(&id)?;

    tracing::info!(overlay_id = %id, "Overlay deleted",);

    Ok(Json(json!({ "status": "deleted" })))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn payload(json: Value) -> OverlayPayload {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn geometry_is_coerced_to_integers() {
        let p = payload(json!({"x": 12.7, "y": "30", "width": 200, "height": "50.9"}));

        assert_eq!(p.x, Some(12));
        assert_eq!(p.y, Some(30));
        assert_eq!(p.width, Some(200));
        assert_eq!(p.height, Some(50));
    }

    #[test]
    fn non_numeric_geometry_is_rejected() {
        let result = serde_json::from_value::<OverlayPayload>(json!({"x": "left"}));
        assert!(result.is_err());
    }

    #[test]
    fn create_requires_every_field() {
        let p = payload(json!({"type": "text", "content": "Hi", "x": 1, "y": 2, "width": 3}));
        assert_matches!(p.into_body(), Err(AppError::BadRequest(msg)) if msg.contains("height"));
    }

    #[test]
    fn merge_keeps_absent_fields() {
        let current = OverlayBody {
            kind: OverlayKind::Text,
            content: "Hello".into(),
            geometry: Geometry::new(1, 2, 3, 4),
        };

        let merged = payload(json!({"x": 80, "content": "Bye", "type": "text"}))
            .merge_into(current)
            .unwrap();

        assert_eq!(merged.content, "Bye");
        assert_eq!(merged.geometry, Geometry::new(80, 2, 3, 4));
    }

    #[test]
    fn merge_rejects_kind_change() {
        let current = OverlayBody {
            kind: OverlayKind::Text,
            content: "Hello".into(),
            geometry: Geometry::new(1, 2, 3, 4),
        };

        let err = payload(json!({"type": "image"})).merge_into(current).unwrap_err();

        assert_eq!(err.field, "type");
    }

    #[test]
    fn merge_keeps_image_content_fixed() {
        let current = OverlayBody {
            kind: OverlayKind::Image,
            content: "http://localhost:5000/uploads/a.png".into(),
            geometry: Geometry::new(1, 2, 3, 4),
        };

        let same = payload(json!({"content": "http://localhost:5000/uploads/a.png", "x": 9}))
            .merge_into(current.clone())
            .unwrap();
        assert_eq!(same.geometry.x, 9);

        let err = payload(json!({"content": "http://evil.example/x.png"}))
            .merge_into(current)
            .unwrap_err();
        assert_eq!(err.field, "content");
    }
}
