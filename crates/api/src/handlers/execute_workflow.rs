//! `execute-workflow` proxy function.
//!
//! Accepts either a generic workflow request or the legacy swag order
//! form, injects the server-held API key, and relays the engine's
//! response verbatim.

use agentdays_core::error::CoreError;
use agentdays_core::swag::SwagOrderRequest;
use agentdays_core::workflow::WorkflowRequest;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::handlers::parse_json;
use crate::state::AppState;

/// The two accepted body shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteWorkflowBody {
    Generic(WorkflowRequest),
    SwagOrder(SwagOrderRequest),
}

impl ExecuteWorkflowBody {
    /// A body naming a deployment is generic; anything else is a swag order.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if value.get("workflowDeploymentName").is_some() {
            serde_json::from_value(value).map(ExecuteWorkflowBody::Generic)
        } else {
            serde_json::from_value(value).map(ExecuteWorkflowBody::SwagOrder)
        }
    }

    /// Validated request to forward upstream.
    pub fn into_request(self, default_logo_url: &str) -> Result<WorkflowRequest, CoreError> {
        match self {
            ExecuteWorkflowBody::Generic(request) => {
                request.validate()?;
                Ok(request)
            }
            ExecuteWorkflowBody::SwagOrder(order) => {
                tracing::info!(
                    recipient = %order.recipient_name,
                    hobby = %order.hobby,
                    "Processing swag order",
                );
                order.to_workflow_request(default_logo_url)
            }
        }
    }
}

/// POST /functions/v1/execute-workflow
///
/// Upstream non-2xx answers are relayed with their status and body as
/// `details`; a rejected execution is a 200 and relayed like any other.
pub async fn execute_workflow(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let vellum = state.vellum()?;

    let value: Value = parse_json(&body)?;
    let request = ExecuteWorkflowBody::from_value(value)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?
        .into_request(&state.config.default_swag_logo_url)?;

    tracing::info!(
        workflow = %request.workflow_deployment_name,
        release_tag = %request.release_tag,
        inputs = request.inputs.len(),
        "Executing workflow",
    );

    let result = vellum.execute_workflow(&request).await?;

    let execution_state = result
        .pointer("/data/state")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let outputs: Vec<&str> = result
        .pointer("/data/outputs")
        .and_then(Value::as_array)
        .map(|outputs| {
            outputs
                .iter()
                .filter_map(|o| o.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    tracing::info!(
        workflow = %request.workflow_deployment_name,
        state = execution_state,
        outputs = ?outputs,
        "Workflow finished",
    );

    Ok(Json(result))
}
