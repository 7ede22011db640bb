//! Invocation client for the proxy functions.
//!
//! [`InvocationClient`] posts a [`WorkflowRequest`] to the
//! `execute-workflow` function and turns the relayed envelope into either
//! the execution's outputs or an [`InvocationError`]. It never holds the
//! platform API key; it authenticates to the functions host with the
//! public publishable key only.

use std::time::Duration;

use agentdays_core::error::CoreError;
use agentdays_core::normalize::{normalize, Normalized};
use agentdays_core::stats_cache::{WorkflowStatsRequest, WorkflowStatsResponse};
use agentdays_core::workflow::{find_output, has_usable_value, WorkflowOutput, WorkflowRequest, WorkflowResponse};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::retry::{is_connect_failure, is_transient, with_retry, RetryConfig, RetryError};

const EXECUTE_PATH: &str = "/functions/v1/execute-workflow";
const STATS_PATH: &str = "/functions/v1/get-workflow-stats";

/// Settings for [`InvocationClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the functions host, without a trailing slash.
    pub base_url: String,
    /// Public key sent as a bearer token, if the host requires one.
    pub publishable_key: Option<String>,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            publishable_key: None,
            timeout: Duration::from_secs(120),
            retry: RetryConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                     | Fallback                        | Default  |
    /// |-----------------------------|---------------------------------|----------|
    /// | `FUNCTIONS_BASE_URL`        | `VITE_SUPABASE_URL`             | required |
    /// | `FUNCTIONS_PUBLISHABLE_KEY` | `VITE_SUPABASE_PUBLISHABLE_KEY` | none     |
    /// | `INVOKE_TIMEOUT_SECS`       |                                 | `120`    |
    /// | `INVOKE_MAX_RETRIES`        |                                 | `1`      |
    pub fn from_env() -> Result<Self, InvocationError> {
        let base_url = env_with_fallback("FUNCTIONS_BASE_URL", "VITE_SUPABASE_URL").ok_or_else(|| {
            InvocationError::Configuration("FUNCTIONS_BASE_URL must be set".to_string())
        })?;

        let mut config = Self::new(base_url);
        config.publishable_key =
            env_with_fallback("FUNCTIONS_PUBLISHABLE_KEY", "VITE_SUPABASE_PUBLISHABLE_KEY");

        if let Ok(raw) = std::env::var("INVOKE_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                InvocationError::Configuration("INVOKE_TIMEOUT_SECS must be a valid u64".to_string())
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Ok(raw) = std::env::var("INVOKE_MAX_RETRIES") {
            config.retry.max_retries = raw.parse().map_err(|_| {
                InvocationError::Configuration("INVOKE_MAX_RETRIES must be a valid u32".to_string())
            })?;
        }

        Ok(config)
    }
}

fn env_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .or_else(|_| std::env::var(fallback))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Ways an invocation can fail. `Display` yields the message shown to
/// the end user.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    /// The proxy answered with a non-2xx status.
    #[error("{message}")]
    RequestFailed { status: u16, message: String },

    /// The workflow ran and rejected the input.
    #[error("{0}")]
    WorkflowRejected(String),

    /// The execution succeeded but the expected output is missing or empty.
    #[error("No recommendations received from the workflow")]
    NoUsableOutput,

    /// Network, DNS, TLS, or timeout failure.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The proxy answered 2xx with a body that is not a workflow envelope.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The request was refused before sending.
    #[error(transparent)]
    InvalidRequest(#[from] CoreError),

    #[error("Invocation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// HTTP client for the proxy functions.
pub struct InvocationClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl InvocationClient {
    pub fn new(config: ClientConfig) -> Result<Self, InvocationError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execute a workflow and return its outputs.
    pub async fn execute(
        &self,
        request: &WorkflowRequest,
    ) -> Result<Vec<WorkflowOutput>, InvocationError> {
        self.execute_with_cancel(request, &CancellationToken::new()).await
    }

    /// Like [`execute`](Self::execute), abandoning the call when `cancel`
    /// fires.
    pub async fn execute_with_cancel(
        &self,
        request: &WorkflowRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<WorkflowOutput>, InvocationError> {
        request.validate()?;

        tracing::debug!(
            workflow = %request.workflow_deployment_name,
            inputs = request.inputs.len(),
            "Invoking workflow",
        );

        let response: WorkflowResponse = self
            .post_json(EXECUTE_PATH, request, Some(cancel), is_connect_failure)
            .await?;
        response.into_outcome().map_err(|message| {
            tracing::info!(
                workflow = %request.workflow_deployment_name,
                %message,
                "Workflow rejected",
            );
            InvocationError::WorkflowRejected(message)
        })
    }

    /// Execute and return the first output named in `names`.
    ///
    /// Fails with [`InvocationError::NoUsableOutput`] when no such output
    /// exists or its value is null, blank, or an empty array.
    pub async fn execute_for_output(
        &self,
        request: &WorkflowRequest,
        names: &[&str],
    ) -> Result<WorkflowOutput, InvocationError> {
        let outputs = self.execute(request).await?;
        select_output(outputs, names)
    }

    /// Execute and normalize the named output.
    ///
    /// Output that cannot be structured comes back as
    /// [`Normalized::Unstructured`], not as an error.
    pub async fn execute_for_result(
        &self,
        request: &WorkflowRequest,
        names: &[&str],
    ) -> Result<Normalized, InvocationError> {
        let output = self.execute_for_output(request, names).await?;
        Ok(normalize(&output.value))
    }

    /// Read a workflow's execution count through the stats function.
    pub async fn workflow_stats(
        &self,
        workflow_name: &str,
        force_refresh: bool,
    ) -> Result<WorkflowStatsResponse, InvocationError> {
        let body = WorkflowStatsRequest {
            workflow_deployment_name: workflow_name.to_string(),
            force_refresh,
        };
        self.post_json(STATS_PATH, &body, None, is_transient).await
    }

    // ---- private helpers ----

    async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        cancel: Option<&CancellationToken>,
        is_retryable: fn(&reqwest::Error) -> bool,
    ) -> Result<T, InvocationError>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.base_url, path);

        let response = with_retry(&self.config.retry, path, cancel, is_retryable, || {
            let mut builder = self.client.post(&url).json(body);
            if let Some(key) = &self.config.publishable_key {
                builder = builder.bearer_auth(key);
            }
            builder.send()
        })
        .await
        .map_err(|e| match e {
            RetryError::Failed(err) => InvocationError::Transport(err),
            RetryError::Cancelled => InvocationError::Cancelled,
        })?;

        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(InvocationError::RequestFailed {
                status: status.as_u16(),
                message: error_message(&bytes, status.as_u16()),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| InvocationError::MalformedResponse(e.to_string()))
    }
}

/// Pick the first usable output named in `names`.
pub fn select_output(
    outputs: Vec<WorkflowOutput>,
    names: &[&str],
) -> Result<WorkflowOutput, InvocationError> {
    find_output(&outputs, names)
        .filter(|o| has_usable_value(&o.value))
        .cloned()
        .ok_or(InvocationError::NoUsableOutput)
}

/// The proxy's `error` field, or a status-based fallback.
fn error_message(body: &[u8], status: u16) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("Request failed with status {status}"))
}
