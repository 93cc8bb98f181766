//! Request handlers

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::json;

use super::AppState;
use crate::media::{boundary_from_content_type, extract_file_field, MediaError};
use crate::tools::{ToolCallRequest, ToolCallResponse, ToolDefinition, ToolError};

const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";

/// Reply of `POST /upload`
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /files/{name}`
pub async fn file_handler(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.ingestor.store().retrieve(&name).await {
        Ok(file) => (
            [
                (header::CONTENT_TYPE, file.content_type),
                (header::CACHE_CONTROL, IMMUTABLE_CACHE),
                (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            ],
            file.bytes,
        )
            .into_response(),
        Err(MediaError::NotFound) => {
            tracing::debug!(name = %name, "Artifact not found");
            (StatusCode::NOT_FOUND, "not found").into_response()
        }
        Err(e) => {
            tracing::error!(name = %name, error = %e, "Artifact read failed");
            (e.http_status(), e.to_string()).into_response()
        }
    }
}

/// `POST /upload`
pub async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<UploadResponse>) {
    match upload(&state, &headers, &body).await {
        Ok((id, url)) => (
            StatusCode::OK,
            Json(UploadResponse {
                ok: true,
                url: Some(url),
                id: Some(id),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Upload rejected");
            (
                e.http_status(),
                Json(UploadResponse {
                    ok: false,
                    url: None,
                    id: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

async fn upload(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(String, String), MediaError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let boundary = boundary_from_content_type(content_type)?;
    let file = extract_file_field(body, &boundary)?;
    let artifact = state.ingestor.ingest_upload(file).await?;
    Ok((artifact.id, artifact.public_url))
}

/// `GET /tools`
pub async fn list_tools_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tools: Vec<ToolDefinition> = state.registry.definitions();
    Json(json!({ "tools": tools }))
}

/// `POST /tools/call`
pub async fn call_tool_handler(
    State(state): State<AppState>,
    Json(request): Json<ToolCallRequest>,
) -> Response {
    match state.registry.call(&request.name, request.arguments).await {
        Ok(output) => Json(ToolCallResponse::from(output)).into_response(),
        Err(e) => {
            let status = match &e {
                ToolError::NotFound(_) => StatusCode::NOT_FOUND,
                ToolError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
                ToolError::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{router, AppState};
    use crate::media::{ContentStore, FetchConfig, IngestPolicy, MediaIngestor, RemoteFetcher};
    use crate::tools::create_registry;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "----retouchtest";
    const INLINE_PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

    async fn app(dir: &std::path::Path, max_bytes: usize) -> Router {
        let fetcher = RemoteFetcher::new(FetchConfig {
            max_bytes,
            allow_private: true,
            ..FetchConfig::default()
        })
        .unwrap();
        let store = ContentStore::open(dir, "https://img.example").await.unwrap();
        let ingestor = Arc::new(MediaIngestor::new(
            IngestPolicy::RemoteAndInline,
            fetcher,
            store,
        ));
        let registry = Arc::new(create_registry(ingestor.clone(), None));
        router(AppState::new(ingestor, registry))
    }

    fn multipart(field: &str, filename: &str, content_type: &str, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::post("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), 1024).await.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_upload_then_retrieve() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1024).await;
        let image = b"\xFF\xD8\xFF\xE0fake-jpeg";

        let response = app
            .clone()
            .oneshot(upload_request(multipart("file", "cat.jpg", "image/jpeg", image)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["ok"], true);
        let url = body["url"].as_str().unwrap().to_string();
        let id = body["id"].as_str().unwrap();
        assert_eq!(url, format!("https://img.example/files/{id}.jpg"));

        let path = url.strip_prefix("https://img.example").unwrap();
        let response = app.oneshot(get(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "public, max-age=31536000, immutable"
        );
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), image);
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 16).await;

        let response = app
            .clone()
            .oneshot(upload_request(multipart("file", "a.txt", "text/plain", b"hello")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let body = json_body(response).await;
        assert_eq!(body["ok"], false);
        assert!(body.get("url").is_none());
        assert!(body["error"].as_str().unwrap().contains("text/plain"));

        let response = app
            .clone()
            .oneshot(upload_request(multipart("file", "a.png", "image/png", &[7u8; 64])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = app
            .clone()
            .oneshot(upload_request(multipart("file", "a.png", "image/png", b"")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(upload_request(multipart("avatar", "a.png", "image/png", b"png")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::post("/upload")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_retrieve_rejects_bad_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("secret.txt"), "nope").unwrap();
        let app = app(dir.path(), 1024).await;

        for uri in [
            "/files/secret.txt",
            "/files/..%2Fsecret.txt",
            "/files/0123456789abcdef0123456789abcdef.png",
        ] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_list_tools() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), 1024).await.oneshot(get("/tools")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let names: Vec<&str> = body["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["enhance_image", "stage_image"]);
        assert_eq!(body["tools"][1]["inputSchema"]["required"][0], "locator");
    }

    fn call(name: &str, arguments: serde_json::Value) -> Request<Body> {
        Request::post("/tools/call")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "name": name, "arguments": arguments }).to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn test_call_stage_image() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1024).await;

        let response = app
            .clone()
            .oneshot(call("stage_image", serde_json::json!({ "locator": INLINE_PNG })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["isError"], false);
        assert_eq!(body["structuredContent"]["status"], "COMPLETED");
        let url = body["structuredContent"]["url"].as_str().unwrap();

        let response = app
            .oneshot(get(url.strip_prefix("https://img.example").unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    }

    fn inline_png_of(len: usize) -> String {
        use base64::Engine;
        let mut pixels = b"\x89PNG\r\n\x1a\n".to_vec();
        pixels.resize(len, 0x5A);
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&pixels)
        )
    }

    #[tokio::test]
    async fn test_call_accepts_inline_payload_above_default_body_limit() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 4 * 1024 * 1024).await;

        // 3 MiB decodes to 4 MiB of base64, past axum's 2 MB default.
        let response = app
            .clone()
            .oneshot(call(
                "stage_image",
                serde_json::json!({ "locator": inline_png_of(3 * 1024 * 1024) }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["structuredContent"]["status"], "COMPLETED");

        // Just over the ceiling still gets a shaped reply, not a bare 413.
        let response = app
            .oneshot(call(
                "stage_image",
                serde_json::json!({ "locator": inline_png_of(4 * 1024 * 1024 + 3) }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["isError"], true);
        assert_eq!(body["structuredContent"]["status"], "ERROR");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_call_enhance_without_backend() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path(), 1024)
            .await
            .oneshot(call("enhance_image", serde_json::json!({ "locator": INLINE_PNG })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["isError"], true);
        assert_eq!(
            body["structuredContent"]["message"],
            "enhancement backend is not configured"
        );
    }

    #[tokio::test]
    async fn test_call_errors() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path(), 1024).await;

        let response = app
            .clone()
            .oneshot(call("resize_image", serde_json::json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("resize_image"));

        let response = app
            .oneshot(call("stage_image", serde_json::json!(["not", "an", "object"])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
