//! Workflow request and response envelopes.
//!
//! Callers describe an execution as a [`WorkflowRequest`] (camelCase JSON,
//! `releaseTag` defaulting to `LATEST`); the proxy re-serializes it into the
//! snake_case [`UpstreamExecuteRequest`] the workflow engine expects. The
//! engine answers with a [`WorkflowResponse`] whose `data.state` is either
//! `FULFILLED` or `REJECTED`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Release tag used when the caller does not pin one.
pub const DEFAULT_RELEASE_TAG: &str = "LATEST";

/// Separator placed between earlier outputs in the exclusion input.
pub const EXCLUSION_SEPARATOR: &str = "\n---\n";

/// Name of the input carrying previously returned outputs.
pub const EXCLUDE_PREVIOUS_INPUT: &str = "exclude_previous";

/// Default message when a rejected execution carries no error detail.
pub const DEFAULT_REJECTION_MESSAGE: &str = "Workflow execution failed";

/// Gift finder deployment.
pub const SECRET_SANTA_DEPLOYMENT: &str = "secret-santa-gift-finder";

/// Book recommender deployment.
pub const BOOK_RECOMMENDER_DEPLOYMENT: &str = "life-context-book-recommender";

/// Output name carrying recommendation lists.
pub const RECOMMENDATIONS_OUTPUT: &str = "recommendations";

/// Alternative output name used by the book recommender.
pub const BOOKS_OUTPUT: &str = "books";

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Kind of a workflow input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputType {
    String,
    Image,
}

/// Value of a workflow input: plain text, or an image reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Text(String),
    Image { src: String },
}

/// A single named input. Order is preserved; duplicate names are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInput {
    #[serde(rename = "type")]
    pub input_type: InputType,
    pub name: String,
    pub value: InputValue,
}

impl WorkflowInput {
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            input_type: InputType::String,
            name: name.into(),
            value: InputValue::Text(value.into()),
        }
    }

    pub fn image(name: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            input_type: InputType::Image,
            name: name.into(),
            value: InputValue::Image { src: src.into() },
        }
    }

    /// Text content of a `STRING` input.
    pub fn as_text(&self) -> Option<&str> {
        match (&self.input_type, &self.value) {
            (InputType::String, InputValue::Text(text)) => Some(text),
            _ => None,
        }
    }
}

/// Build `STRING` inputs from `(name, value)` form fields, in order.
pub fn inputs_from_fields<'a, I>(fields: I) -> Vec<WorkflowInput>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    fields
        .into_iter()
        .map(|(name, value)| WorkflowInput::string(name, value))
        .collect()
}

/// Look up the first `STRING` input with the given name.
pub fn field_value<'a>(inputs: &'a [WorkflowInput], name: &str) -> Option<&'a str> {
    inputs
        .iter()
        .filter(|input| input.name == name)
        .find_map(WorkflowInput::as_text)
}

/// Re-derive form fields from a list of inputs. The first occurrence of a
/// name wins; image inputs are skipped.
pub fn fields_from_inputs(inputs: &[WorkflowInput]) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for input in inputs {
        if let Some(text) = input.as_text() {
            fields
                .entry(input.name.clone())
                .or_insert_with(|| text.to_string());
        }
    }
    fields
}

/// Build the `exclude_previous` input from earlier outputs.
///
/// Returns `None` when there is nothing to exclude, so first invocations
/// carry no extra input.
pub fn exclusion_input(previous: &[String]) -> Option<WorkflowInput> {
    if previous.is_empty() {
        return None;
    }
    Some(WorkflowInput::string(
        EXCLUDE_PREVIOUS_INPUT,
        previous.join(EXCLUSION_SEPARATOR),
    ))
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

fn default_release_tag() -> String {
    DEFAULT_RELEASE_TAG.to_string()
}

/// Caller-facing execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRequest {
    pub workflow_deployment_name: String,
    #[serde(default = "default_release_tag")]
    pub release_tag: String,
    #[serde(default)]
    pub inputs: Vec<WorkflowInput>,
}

/// Body sent to the workflow engine's execute endpoint.
#[derive(Debug, Serialize)]
pub struct UpstreamExecuteRequest<'a> {
    pub workflow_deployment_name: &'a str,
    pub release_tag: &'a str,
    pub inputs: &'a [WorkflowInput],
}

impl WorkflowRequest {
    /// Request against the `LATEST` release.
    pub fn new(deployment: impl Into<String>, inputs: Vec<WorkflowInput>) -> Self {
        Self {
            workflow_deployment_name: deployment.into(),
            release_tag: default_release_tag(),
            inputs,
        }
    }

    pub fn with_release_tag(mut self, tag: impl Into<String>) -> Self {
        self.release_tag = tag.into();
        self
    }

    /// Reject requests the engine could never run.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.workflow_deployment_name.trim().is_empty() {
            return Err(CoreError::Validation(
                "workflowDeploymentName is required".to_string(),
            ));
        }
        if self.release_tag.trim().is_empty() {
            return Err(CoreError::Validation(
                "releaseTag must not be empty".to_string(),
            ));
        }
        if let Some(pos) = self.inputs.iter().position(|i| i.name.trim().is_empty()) {
            return Err(CoreError::Validation(format!(
                "Input at position {pos} has an empty name"
            )));
        }
        Ok(())
    }

    /// Re-shape into the engine's snake_case envelope.
    pub fn to_upstream(&self) -> UpstreamExecuteRequest<'_> {
        UpstreamExecuteRequest {
            workflow_deployment_name: &self.workflow_deployment_name,
            release_tag: &self.release_tag,
            inputs: &self.inputs,
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Terminal state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Fulfilled,
    Rejected,
}

/// A named output of a fulfilled execution. `value` has no fixed shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutput {
    pub name: String,
    #[serde(rename = "type", default)]
    pub output_type: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionData {
    pub state: ExecutionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<WorkflowOutput>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

/// Envelope returned by the engine and relayed by the proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResponse {
    pub data: ExecutionData,
}

impl WorkflowResponse {
    /// Outputs of a fulfilled execution, or the rejection message.
    ///
    /// Outputs are never inspected for a rejected execution.
    pub fn into_outcome(self) -> Result<Vec<WorkflowOutput>, String> {
        match self.data.state {
            ExecutionState::Fulfilled => Ok(self.data.outputs.unwrap_or_default()),
            ExecutionState::Rejected => Err(self
                .data
                .error
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_REJECTION_MESSAGE.to_string())),
        }
    }
}

/// First output whose name is one of `names`, in output order.
pub fn find_output<'a>(outputs: &'a [WorkflowOutput], names: &[&str]) -> Option<&'a WorkflowOutput> {
    outputs.iter().find(|o| names.contains(&o.name.as_str()))
}

/// Whether an output value carries anything worth normalizing.
pub fn has_usable_value(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::String(s) => !s.trim().is_empty(),
        serde_json::Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Feature forms
// ---------------------------------------------------------------------------

/// Gift finder form: who the gift is for and how much to spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftFinderForm {
    pub friend_description: String,
    pub budget: String,
}

impl GiftFinderForm {
    pub fn to_inputs(&self) -> Vec<WorkflowInput> {
        inputs_from_fields([
            ("friend_description", self.friend_description.as_str()),
            ("budget", self.budget.as_str()),
        ])
    }
}

/// Book recommender form: a free-text life situation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookFinderForm {
    pub life_situation: String,
}

impl BookFinderForm {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.life_situation.trim().is_empty() {
            return Err(CoreError::Validation(
                "Tell us about your goals or life situation to get book recommendations"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_request(&self) -> WorkflowRequest {
        WorkflowRequest::new(
            BOOK_RECOMMENDER_DEPLOYMENT,
            inputs_from_fields([("life_situation", self.life_situation.as_str())]),
        )
    }
}
