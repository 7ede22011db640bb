//! Legacy fixed-shape swag order.
//!
//! Older callers post a flat order form instead of a generic workflow
//! request. The proxy translates it into named inputs for the printing
//! workflow, injecting a default logo image when the caller sends none.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::workflow::{WorkflowInput, WorkflowRequest};

/// Deployment that designs and prints the swag item.
pub const SWAG_DEPLOYMENT: &str = "printful-printing-agent";

/// Logo asset used when the order does not carry one.
pub const DEFAULT_SWAG_LOGO_URL: &str =
    "https://bicorrclgguttsgwxksi.supabase.co/storage/v1/object/public/assets/grumpy-cat-logo.jpg";

/// Missing fields deserialize as empty and are reported by validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct SwagOrderRequest {
    #[validate(length(min = 1))]
    pub recipient_name: String,
    #[validate(length(min = 1))]
    pub address1: String,
    #[validate(length(min = 1))]
    pub city: String,
    pub state_code: Option<String>,
    #[validate(length(min = 1))]
    pub country_code: String,
    #[validate(length(min = 1))]
    pub zip_code: String,
    #[validate(length(min = 1))]
    pub hobby: String,
    pub logo_url: Option<String>,
}

impl SwagOrderRequest {
    /// Translate the order into a request for [`SWAG_DEPLOYMENT`].
    ///
    /// `default_logo_url` is used when `logo_url` is absent or blank.
    pub fn to_workflow_request(&self, default_logo_url: &str) -> Result<WorkflowRequest, CoreError> {
        self.validate()?;

        let logo = self
            .logo_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(default_logo_url);

        let inputs = vec![
            WorkflowInput::string("recipient_name", &self.recipient_name),
            WorkflowInput::string("address1", &self.address1),
            WorkflowInput::string("city", &self.city),
            WorkflowInput::string("state_code", self.state_code.as_deref().unwrap_or("")),
            WorkflowInput::string("country_code", &self.country_code),
            WorkflowInput::string("zip_code", &self.zip_code),
            WorkflowInput::string("hobby", &self.hobby),
            WorkflowInput::image("logo", logo),
        ];

        Ok(WorkflowRequest::new(SWAG_DEPLOYMENT, inputs))
    }
}
