//! Request handlers for the proxy functions.
//!
//! Both handlers read the raw body so the credential check runs before
//! the body is parsed.

pub mod execute_workflow;
pub mod workflow_stats;

use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};

/// Parse a JSON request body, mapping syntax errors to 400.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> AppResult<T> {
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))
}
