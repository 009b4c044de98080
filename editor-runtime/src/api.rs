//! Axum-based HTTP API for launching editors.
//!
//! Provides REST endpoints for:
//! - Starting an editor from a template
//! - Listing containers started by this process
//! - Polling launch progress
//!
//! Unknown paths fall through to the static browser client when its
//! directory exists.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::launcher::EditorLauncher;

type AppState = Arc<EditorLauncher>;

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ApiError {
    error: String,
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError { error: msg.into() }))
}

/// Body returned when a launch fails.
#[derive(Debug, Serialize)]
pub struct StartEditorError {
    error: String,
    details: String,
    /// Error body from the Docker daemon, when the failure came from it.
    #[serde(skip_serializing_if = "Option::is_none")]
    json: Option<Value>,
}

// ---------------------------------------------------------------------------
// Editor endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct StartEditorRequest {
    #[serde(default)]
    template: Option<String>,
}

async fn start_editor(State(launcher): State<AppState>, body: Bytes) -> impl IntoResponse {
    // A missing or malformed body is an invalid template, not a client error.
    let request: StartEditorRequest = serde_json::from_slice(&body).unwrap_or_default();
    let template = request.template.unwrap_or_default();

    match launcher.start_editor(&template).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => {
            error!("Editor start error: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StartEditorError {
                    error: "Failed to start editor".to_string(),
                    details: err.to_string(),
                    json: err.docker_json(),
                }),
            )
                .into_response()
        }
    }
}

async fn list_containers(State(launcher): State<AppState>) -> impl IntoResponse {
    Json(launcher.list_containers())
}

// ---------------------------------------------------------------------------
// Launch progress endpoints
// ---------------------------------------------------------------------------

async fn list_launches(State(launcher): State<AppState>) -> impl IntoResponse {
    let launches = launcher.launches().list_all();
    Json(serde_json::json!({ "launches": launches }))
}

async fn get_launch(
    State(launcher): State<AppState>,
    Path(launch_id): Path<Uuid>,
) -> impl IntoResponse {
    match launcher.launches().get(launch_id) {
        Some(status) => (StatusCode::OK, Json(status)).into_response(),
        None => api_error(StatusCode::NOT_FOUND, "Launch not found").into_response(),
    }
}

// ---------------------------------------------------------------------------
// Router builder
// ---------------------------------------------------------------------------

fn editor_routes() -> Router<AppState> {
    Router::new()
        .route("/start-editor", post(start_editor))
        .route("/containers", get(list_containers))
        .route("/launches", get(list_launches))
        .route("/launches/{launch_id}", get(get_launch))
}

/// Build the editor API router with all endpoints and CORS support.
pub fn editor_api_router(launcher: Arc<EditorLauncher>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .nest("/api/editor", editor_routes())
        // Paths used by the first single-file server
        .route("/start-editor", post(start_editor))
        .route("/containers", get(list_containers));

    let static_dir = launcher.config().static_dir.clone();
    if static_dir.is_dir() {
        info!("Serving static files from {}", static_dir.display());
        router = router.fallback_service(ServeDir::new(static_dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(launcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngine;
    use crate::runtime::EditorRuntimeConfig;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn config() -> EditorRuntimeConfig {
        EditorRuntimeConfig {
            startup_delay: Duration::ZERO,
            verify_retry_delay: Duration::ZERO,
            templates_dir: "/nonexistent/templates".into(),
            static_dir: "/nonexistent/static".into(),
            ..Default::default()
        }
    }

    fn app_with(engine: MockEngine, config: EditorRuntimeConfig) -> Router {
        editor_api_router(Arc::new(EditorLauncher::new(Arc::new(engine), config)))
    }

    fn app() -> Router {
        app_with(
            MockEngine::new().with_image("sha256:aaa", &["code-server-react:latest"]),
            config(),
        )
    }

    async fn body_json(body: Body) -> Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn start_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_start_editor_returns_url() {
        let response = app()
            .oneshot(start_request(
                "/api/editor/start-editor",
                r#"{"template":"react"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response.into_body()).await;
        let url = json["url"].as_str().unwrap();
        assert!(url.starts_with("http://localhost:8"), "unexpected: {url}");
        assert!(url.ends_with("/?folder=/home/coder/project/my-react-app&autostart=1"));
    }

    #[tokio::test]
    async fn test_start_editor_invalid_template() {
        let response = app()
            .oneshot(start_request(
                "/api/editor/start-editor",
                r#"{"template":"fortran"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response.into_body()).await;
        assert_eq!(json["error"], "Failed to start editor");
        assert_eq!(
            json["details"],
            "Failed to start fortran editor: Invalid template: fortran"
        );
        assert!(json.get("json").is_none());
    }

    #[tokio::test]
    async fn test_start_editor_without_body() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/editor/start-editor")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response.into_body()).await;
        assert!(json["details"].as_str().unwrap().contains("Invalid template"));
    }

    #[tokio::test]
    async fn test_start_editor_includes_docker_body() {
        let engine = MockEngine::new().with_image("sha256:aaa", &["code-server-react:latest"]);
        engine
            .fail_create
            .store(true, std::sync::atomic::Ordering::Relaxed);

        let response = app_with(engine, config())
            .oneshot(start_request(
                "/api/editor/start-editor",
                r#"{"template":"react"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response.into_body()).await;
        assert_eq!(json["json"]["statusCode"], 500);
        assert_eq!(json["json"]["message"], "Mock create failure");
    }

    #[tokio::test]
    async fn test_containers_lists_started_editors() {
        let app = app();
        let response = app
            .clone()
            .oneshot(start_request("/start-editor", r#"{"template":"react"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/editor/containers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response.into_body()).await;
        let items = json.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "mock-container-0");
        assert_eq!(items[0]["template"], "react");
        assert!(items[0]["startTime"].is_string());
        assert!(items[0]["port"].is_u64());
    }

    #[tokio::test]
    async fn test_containers_empty() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/containers")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response.into_body()).await;
        assert!(json.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_launch_lifecycle() {
        let app = app();
        app.clone()
            .oneshot(start_request(
                "/api/editor/start-editor",
                r#"{"template":"react"}"#,
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/editor/launches")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response.into_body()).await;
        let launch = &json["launches"][0];
        assert_eq!(launch["phase"], "ready");
        assert_eq!(launch["progress_pct"], 100);
        let launch_id = launch["launch_id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/editor/launches/{launch_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response.into_body()).await;
        assert_eq!(json["template"], "react");
        assert_eq!(json["container_id"], "mock-container-0");
    }

    #[tokio::test]
    async fn test_get_launch_not_found() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/editor/launches/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serves_static_client() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>editors</h1>").unwrap();
        let config = EditorRuntimeConfig {
            static_dir: dir.path().to_path_buf(),
            ..config()
        };

        let response = app_with(MockEngine::new(), config)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"<h1>editors</h1>");
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/editor/start-editor")
                    .header("origin", "http://localhost:5173")
                    .header("access-control-request-method", "POST")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("access-control-allow-origin"));
    }
}
