//! REST client for the Vellum platform.
//!
//! Wraps the two upstream hosts the proxy functions talk to: the predict
//! host (workflow execution) and the API host (deployment lookup and
//! execution counts). Holds the API key; nothing here is ever exposed to
//! browser callers.

use std::str::FromStr;
use std::time::Duration;

use agentdays_core::workflow::WorkflowRequest;
use reqwest::Url;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::retry::{is_connect_failure, is_transient, with_retry, RetryConfig, RetryError};

/// Header carrying the API key.
const API_KEY_HEADER: &str = "X-API-KEY";

pub const DEFAULT_PREDICT_URL: &str = "https://predict.vellum.ai";
pub const DEFAULT_API_URL: &str = "https://api.vellum.ai";

/// Upstream collection that reports a deployment's execution count.
///
/// Both collections are paginated and carry a total `count`; which one
/// reflects the figure wanted depends on the upstream API version in use,
/// so it is chosen by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionCountEndpoint {
    Executions,
    ExecutionEvents,
}

impl ExecutionCountEndpoint {
    pub fn path_segment(self) -> &'static str {
        match self {
            ExecutionCountEndpoint::Executions => "executions",
            ExecutionCountEndpoint::ExecutionEvents => "execution-events",
        }
    }
}

impl FromStr for ExecutionCountEndpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "executions" => Ok(ExecutionCountEndpoint::Executions),
            "execution-events" => Ok(ExecutionCountEndpoint::ExecutionEvents),
            other => Err(format!(
                "unknown execution count endpoint '{other}' (expected 'executions' or 'execution-events')"
            )),
        }
    }
}

/// Connection settings for [`VellumApi`].
#[derive(Debug, Clone)]
pub struct VellumApiConfig {
    pub api_key: String,
    pub predict_url: String,
    pub api_url: String,
    /// Per-request timeout applied by the HTTP client.
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub count_endpoint: ExecutionCountEndpoint,
}

impl VellumApiConfig {
    /// Settings for the public hosts with the given key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            predict_url: DEFAULT_PREDICT_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(120),
            retry: RetryConfig::default(),
            count_endpoint: ExecutionCountEndpoint::Executions,
        }
    }
}

/// Errors from the Vellum REST layer.
#[derive(Debug, thiserror::Error)]
pub enum VellumApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Vellum returned a non-2xx status code.
    #[error("Vellum API error: {status}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body, relayed to callers as `details`.
        body: String,
    },

    /// The outbound call was abandoned.
    #[error("Request cancelled")]
    Cancelled,

    /// A configured host is not a usable base URL.
    #[error("Invalid Vellum URL '{0}'")]
    InvalidBaseUrl(String),

    /// A path segment (e.g. a deployment name) cannot be addressed.
    #[error("Invalid path segment '{0}'")]
    InvalidPathSegment(String),
}

/// Subset of a workflow deployment record.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Paginated list envelope; only the total is read.
#[derive(Debug, Deserialize)]
struct PaginatedCount {
    #[serde(default)]
    count: Option<i64>,
}

/// HTTP client for the Vellum platform.
pub struct VellumApi {
    client: reqwest::Client,
    config: VellumApiConfig,
    predict_base: Url,
    api_base: Url,
}

impl VellumApi {
    pub fn new(config: VellumApiConfig) -> Result<Self, VellumApiError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let predict_base = parse_base(&config.predict_url)?;
        let api_base = parse_base(&config.api_url)?;
        Ok(Self {
            client,
            config,
            predict_base,
            api_base,
        })
    }

    pub fn count_endpoint(&self) -> ExecutionCountEndpoint {
        self.config.count_endpoint
    }

    /// Run a workflow and return the engine's response body unchanged.
    ///
    /// Sends `POST /v1/execute-workflow` on the predict host with the
    /// snake_case envelope. The body is returned as raw JSON so the proxy
    /// can relay it verbatim.
    ///
    /// Executions are not idempotent, so only connect failures are retried.
    pub async fn execute_workflow(
        &self,
        request: &WorkflowRequest,
    ) -> Result<serde_json::Value, VellumApiError> {
        self.execute_workflow_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`execute_workflow`](Self::execute_workflow), abandoning the
    /// call with [`VellumApiError::Cancelled`] when `cancel` fires.
    pub async fn execute_workflow_with_cancel(
        &self,
        request: &WorkflowRequest,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, VellumApiError> {
        let url = endpoint(&self.predict_base, &["v1", "execute-workflow"])?;
        let body = request.to_upstream();

        let response = self
            .send("execute_workflow", Some(cancel), is_connect_failure, || {
                self.client
                    .post(url.clone())
                    .header(API_KEY_HEADER, &self.config.api_key)
                    .json(&body)
            })
            .await?;

        Self::parse_response(response).await
    }

    /// Look up a deployment by name.
    ///
    /// Sends `GET /v1/workflow-deployments/{name}` on the API host.
    /// The name is sent as a single percent-encoded path segment.
    pub async fn get_deployment(&self, name: &str) -> Result<DeploymentSummary, VellumApiError> {
        let url = endpoint(&self.api_base, &["v1", "workflow-deployments", name])?;
        let response = self
            .send("get_deployment", None, is_transient, || {
                self.client
                    .get(url.clone())
                    .header(API_KEY_HEADER, &self.config.api_key)
            })
            .await?;

        Self::parse_response(response).await
    }

    /// Total executions recorded for a deployment id.
    ///
    /// Requests a single-item page of the configured collection and reads
    /// its `count`; a missing count reads as zero.
    pub async fn execution_count(&self, deployment_id: &str) -> Result<i64, VellumApiError> {
        let url = endpoint(
            &self.api_base,
            &[
                "v1",
                "workflow-deployments",
                deployment_id,
                self.config.count_endpoint.path_segment(),
            ],
        )?;
        let response = self
            .send("execution_count", None, is_transient, || {
                self.client
                    .get(url.clone())
                    .query(&[("limit", "1")])
                    .header(API_KEY_HEADER, &self.config.api_key)
            })
            .await?;

        let page: PaginatedCount = Self::parse_response(response).await?;
        Ok(page.count.unwrap_or(0))
    }

    /// Resolve a deployment by name, then read its execution count.
    pub async fn fetch_execution_count(&self, deployment_name: &str) -> Result<i64, VellumApiError> {
        let deployment = self.get_deployment(deployment_name).await?;
        tracing::debug!(
            workflow = deployment_name,
            deployment_id = %deployment.id,
            "Resolved workflow deployment",
        );
        self.execution_count(&deployment.id).await
    }

    // ---- private helpers ----

    /// Send a request built by `build`, retrying failures `is_retryable`
    /// accepts.
    async fn send(
        &self,
        operation: &str,
        cancel: Option<&CancellationToken>,
        is_retryable: fn(&reqwest::Error) -> bool,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, VellumApiError> {
        with_retry(&self.config.retry, operation, cancel, is_retryable, || build().send())
            .await
            .map_err(|e| match e {
                RetryError::Failed(err) => VellumApiError::Request(err),
                RetryError::Cancelled => VellumApiError::Cancelled,
            })
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`VellumApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, VellumApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(VellumApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, VellumApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

fn parse_base(raw: &str) -> Result<Url, VellumApiError> {
    match Url::parse(raw) {
        Ok(url) if !url.cannot_be_a_base() => Ok(url),
        _ => Err(VellumApiError::InvalidBaseUrl(raw.to_string())),
    }
}

/// `base` with `segments` appended, each percent-encoded as one segment.
///
/// Empty, `.` and `..` segments are refused rather than dropped.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, VellumApiError> {
    if let Some(bad) = segments
        .iter()
        .find(|s| s.is_empty() || **s == "." || **s == "..")
    {
        return Err(VellumApiError::InvalidPathSegment(bad.to_string()));
    }

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| VellumApiError::InvalidBaseUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use agentdays_core::workflow::WorkflowInput;
    use assert_matches::assert_matches;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn api_for(base: &str) -> VellumApi {
        let mut config = VellumApiConfig::new("test-key");
        config.predict_url = base.to_string();
        config.api_url = base.to_string();
        config.retry = RetryConfig::none();
        VellumApi::new(config).unwrap()
    }

    #[tokio::test]
    async fn execute_sends_snake_case_envelope_and_key() {
        let seen: Arc<Mutex<Option<(Option<String>, Value)>>> = Arc::default();
        let captured = Arc::clone(&seen);
        let router = Router::new().route(
            "/v1/execute-workflow",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let captured = Arc::clone(&captured);
                async move {
                    let key = headers
                        .get("x-api-key")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *captured.lock().unwrap() = Some((key, body));
                    Json(json!({"data": {"state": "FULFILLED", "outputs": []}}))
                }
            }),
        );
        let base = serve(router).await;

        let request = WorkflowRequest::new("deploy", vec![WorkflowInput::string("budget", "$50")]);
        let body = api_for(&base).execute_workflow(&request).await.unwrap();
        assert_eq!(body["data"]["state"], "FULFILLED");

        let (key, sent) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(key.as_deref(), Some("test-key"));
        assert_eq!(sent["workflow_deployment_name"], "deploy");
        assert_eq!(sent["release_tag"], "LATEST");
        assert_eq!(sent["inputs"][0]["name"], "budget");
    }

    #[tokio::test]
    async fn non_success_status_carries_body() {
        let router = Router::new().route(
            "/v1/execute-workflow",
            post(|| async { (StatusCode::FORBIDDEN, "invalid api key") }),
        );
        let base = serve(router).await;

        let err = api_for(&base)
            .execute_workflow(&WorkflowRequest::new("deploy", vec![]))
            .await
            .unwrap_err();
        assert_matches!(err, VellumApiError::ApiError { status: 403, ref body } if body == "invalid api key");
    }

    #[tokio::test]
    async fn execution_count_resolves_deployment_first() {
        let router = Router::new()
            .route(
                "/v1/workflow-deployments/{name}",
                get(|Path(name): Path<String>| async move {
                    Json(json!({"id": format!("uuid-of-{name}"), "name": name}))
                }),
            )
            .route(
                "/v1/workflow-deployments/{name}/executions",
                get(|Path(id): Path<String>, Query(q): Query<Vec<(String, String)>>| async move {
                    assert_eq!(id, "uuid-of-agent-reads");
                    assert!(q.contains(&("limit".to_string(), "1".to_string())));
                    Json(json!({"count": 1234, "results": []}))
                }),
            );
        let base = serve(router).await;

        let count = api_for(&base).fetch_execution_count("agent-reads").await.unwrap();
        assert_eq!(count, 1234);
    }

    #[tokio::test]
    async fn execution_events_endpoint_is_selectable() {
        let router = Router::new().route(
            "/v1/workflow-deployments/{name}/execution-events",
            get(|| async { Json(json!({"results": []})) }),
        );
        let base = serve(router).await;

        let mut config = VellumApiConfig::new("k");
        config.api_url = base;
        config.count_endpoint = ExecutionCountEndpoint::ExecutionEvents;
        let api = VellumApi::new(config).unwrap();

        // A page without a count reads as zero.
        assert_eq!(api.execution_count("abc").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn timed_out_execution_is_not_resent() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new().route(
            "/v1/execute-workflow",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(400)).await;
                    Json(json!({"data": {"state": "FULFILLED", "outputs": []}}))
                }
            }),
        );
        let base = serve(router).await;

        let mut config = VellumApiConfig::new("test-key");
        config.predict_url = base;
        config.timeout = Duration::from_millis(150);
        config.retry = RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        };
        let api = VellumApi::new(config).unwrap();

        let err = api
            .execute_workflow(&WorkflowRequest::new("deploy", vec![]))
            .await
            .unwrap_err();
        assert_matches!(err, VellumApiError::Request(ref e) if e.is_timeout());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_execution_returns_cancelled() {
        let router = Router::new().route(
            "/v1/execute-workflow",
            post(|| async { std::future::pending::<()>().await }),
        );
        let base = serve(router).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = api_for(&base)
            .execute_workflow_with_cancel(&WorkflowRequest::new("deploy", vec![]), &cancel)
            .await
            .unwrap_err();
        assert_matches!(err, VellumApiError::Cancelled);
    }

    #[tokio::test]
    async fn deployment_name_stays_one_path_segment() {
        let names: Arc<Mutex<Vec<String>>> = Arc::default();
        let stray: Arc<Mutex<Vec<String>>> = Arc::default();
        let seen_names = Arc::clone(&names);
        let seen_stray = Arc::clone(&stray);
        let router = Router::new()
            .route(
                "/v1/workflow-deployments/{name}",
                get(move |Path(name): Path<String>| {
                    let seen = Arc::clone(&seen_names);
                    async move {
                        seen.lock().unwrap().push(name);
                        Json(json!({"id": "dep-1", "name": "ignored"}))
                    }
                }),
            )
            .fallback(move |uri: Uri| {
                let seen = Arc::clone(&seen_stray);
                async move {
                    seen.lock().unwrap().push(uri.to_string());
                    StatusCode::NOT_FOUND
                }
            });
        let base = serve(router).await;

        let name = "../../v1/admin/keys?x=";
        let deployment = api_for(&base).get_deployment(name).await.unwrap();
        assert_eq!(deployment.id, "dep-1");
        assert_eq!(*names.lock().unwrap(), vec![name.to_string()]);
        assert!(stray.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dot_segment_names_are_refused_before_sending() {
        let api = api_for("http://127.0.0.1:1");
        for name in ["..", ".", ""] {
            let err = api.get_deployment(name).await.unwrap_err();
            assert_matches!(err, VellumApiError::InvalidPathSegment(_), "name: {name:?}");
        }
    }

    #[test]
    fn endpoint_keeps_base_path_and_encodes_segments() {
        let base = Url::parse("http://vellum.test/api/").unwrap();
        let url = endpoint(&base, &["v1", "workflow-deployments", "a/b c"]).unwrap();
        assert_eq!(url.as_str(), "http://vellum.test/api/v1/workflow-deployments/a%2Fb%20c");
    }

    #[test]
    fn unusable_base_url_is_rejected() {
        let mut config = VellumApiConfig::new("k");
        config.api_url = "not a url".to_string();
        assert_matches!(VellumApi::new(config).err(), Some(VellumApiError::InvalidBaseUrl(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_request_error() {
        let api = api_for("http://127.0.0.1:1");
        let err = api.get_deployment("x").await.unwrap_err();
        assert_matches!(err, VellumApiError::Request(_));
    }

    #[test]
    fn endpoint_parses_from_config_string() {
        assert_eq!(
            "execution-events".parse::<ExecutionCountEndpoint>().unwrap(),
            ExecutionCountEndpoint::ExecutionEvents
        );
        assert!("events".parse::<ExecutionCountEndpoint>().is_err());
    }
}
