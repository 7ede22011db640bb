use std::sync::Arc;

use agentdays_vellum::api::{VellumApi, VellumApiError};

use crate::config::ServerConfig;
use crate::error::AppError;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: agentdays_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Upstream client; `None` when no API key is configured.
    pub vellum: Option<Arc<VellumApi>>,
}

impl AppState {
    /// Build the state, creating the upstream client when a key is set.
    pub fn new(pool: agentdays_db::DbPool, config: ServerConfig) -> Result<Self, VellumApiError> {
        let vellum = match config.vellum.api_config() {
            Some(api_config) => Some(Arc::new(VellumApi::new(api_config)?)),
            None => None,
        };

        Ok(Self {
            pool,
            config: Arc::new(config),
            vellum,
        })
    }

    /// The upstream client, or [`AppError::MissingCredential`].
    pub fn vellum(&self) -> Result<&VellumApi, AppError> {
        self.vellum.as_deref().ok_or(AppError::MissingCredential)
    }
}
