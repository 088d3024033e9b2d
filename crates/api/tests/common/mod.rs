#![allow(dead_code)]

use std::path::Path;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use overlay_api::config::ServerConfig;
use overlay_api::router::build_app_router;
use overlay_api::state::AppState;

pub const BOUNDARY: &str = "overlay-test-boundary";

/// Build a test `ServerConfig` whose upload and HLS folders live under `root`.
pub fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        upload_dir: root.join("uploads"),
        hls_dir: root.join("hls"),
        max_upload_bytes: 1024,
    }
}

/// Build the full application router over an empty store. The returned
/// directory must outlive the router.
pub fn build_test_app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let app = build_app_router(AppState::new(test_config(dir.path())));
    (app, dir)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

pub async fn delete(app: &Router, uri: &str) -> Response<Body> {
    send(
        app,
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

/// Send `body` as JSON with the given method.
pub async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> Response<Body> {
    send(
        app,
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

/// A multipart body with a single file part.
pub fn multipart_request(field: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/api/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Create a text overlay and return its `_id`.
pub async fn create_text(app: &Router, content: &str) -> String {
    let response = send_json(
        app,
        Method::POST,
        "/api/overlays",
        serde_json::json!({
            "type": "text",
            "content": content,
            "x": 50, "y": 50, "width": 200, "height": 50,
        }),
    )
    .await;
    body_json(response).await["_id"]
        .as_str()
        .unwrap()
        .to_string()
}
