#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use agentdays_api::config::{ServerConfig, VellumSettings};
use agentdays_api::router::build_app_router;
use agentdays_api::state::AppState;
use agentdays_vellum::api::ExecutionCountEndpoint;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::Response;
use axum::routing::{get as get_route, post as post_route};
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

pub const TEST_API_KEY: &str = "test-vellum-key";
pub const TEST_LOGO_URL: &str = "https://assets.test/logo.png";

/// Build a test `ServerConfig` pointing both upstream hosts at `upstream`.
///
/// `upstream = None` leaves the API key unset.
pub fn test_config(upstream: Option<&str>) -> ServerConfig {
    let base = upstream.unwrap_or("http://127.0.0.1:9").to_string();
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["*".to_string()],
        request_timeout_secs: 30,
        vellum: VellumSettings {
            api_key: upstream.map(|_| TEST_API_KEY.to_string()),
            predict_url: base.clone(),
            api_url: base,
            timeout_secs: 5,
            max_retries: 0,
            count_endpoint: ExecutionCountEndpoint::Executions,
        },
        stats_ttl: chrono::Duration::hours(24),
        default_swag_logo_url: TEST_LOGO_URL.to_string(),
    }
}

/// Full application router with the production middleware stack.
pub fn build_test_app_with(pool: PgPool, config: ServerConfig) -> Router {
    let state = AppState::new(pool, config).unwrap();
    build_app_router(state)
}

/// Full application router with no upstream credential configured.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with(pool, test_config(None))
}

/// Full application router talking to the stub at `upstream`.
pub fn build_test_app_for(pool: PgPool, upstream: &str) -> Router {
    build_test_app_with(pool, test_config(Some(upstream)))
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_raw(app: Router, uri: &str, body: &'static str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

// ---------------------------------------------------------------------------
// Upstream stub
// ---------------------------------------------------------------------------

/// Serve `router` on an ephemeral local port; returns its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A request the stub received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub api_key: Option<String>,
    pub body: Value,
}

pub type Journal = Arc<Mutex<Vec<Recorded>>>;

fn record(journal: &Journal, path: &str, headers: &HeaderMap, body: Value) {
    journal.lock().unwrap().push(Recorded {
        path: path.to_string(),
        api_key: headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });
}

/// Upstream whose execute endpoint answers `(status, reply)`.
pub async fn execute_stub(status: StatusCode, reply: Value) -> (String, Journal) {
    let journal: Journal = Arc::default();
    let seen = Arc::clone(&journal);
    let router = Router::new().route(
        "/v1/execute-workflow",
        post_route(move |headers: HeaderMap, Json(body): Json<Value>| {
            let seen = Arc::clone(&seen);
            let reply = reply.clone();
            async move {
                record(&seen, "/v1/execute-workflow", &headers, body);
                (status, Json(reply))
            }
        }),
    );
    (serve(router).await, journal)
}

/// Upstream resolving any deployment name to `dep-{name}` and reporting
/// `count` executions; `count = None` makes the count endpoint fail 503.
pub async fn stats_stub(count: Option<i64>) -> (String, Journal) {
    let journal: Journal = Arc::default();
    let deployments = Arc::clone(&journal);
    let counts = Arc::clone(&journal);

    let router = Router::new()
        .route(
            "/v1/workflow-deployments/{name}",
            get_route(
                move |axum::extract::Path(name): axum::extract::Path<String>, headers: HeaderMap| {
                    let seen = Arc::clone(&deployments);
                    async move {
                        record(&seen, &format!("/v1/workflow-deployments/{name}"), &headers, Value::Null);
                        Json(json!({"id": format!("dep-{name}"), "name": name}))
                    }
                },
            ),
        )
        .route(
            "/v1/workflow-deployments/{name}/executions",
            get_route(
                move |axum::extract::Path(id): axum::extract::Path<String>, headers: HeaderMap| {
                    let seen = Arc::clone(&counts);
                    async move {
                        record(&seen, &format!("/v1/workflow-deployments/{id}/executions"), &headers, Value::Null);
                        match count {
                            Some(count) => (StatusCode::OK, Json(json!({"count": count, "results": []}))),
                            None => (
                                StatusCode::SERVICE_UNAVAILABLE,
                                Json(json!({"detail": "temporarily unavailable"})),
                            ),
                        }
                    }
                },
            ),
        );
    (serve(router).await, journal)
}
