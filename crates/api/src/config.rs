use std::time::Duration;

use agentdays_core::stats_cache::STATS_TTL_HOURS;
use agentdays_core::swag::DEFAULT_SWAG_LOGO_URL;
use agentdays_vellum::api::{
    ExecutionCountEndpoint, VellumApiConfig, DEFAULT_API_URL, DEFAULT_PREDICT_URL,
};
use agentdays_vellum::retry::RetryConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the database URL have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins from comma-separated `CORS_ORIGINS`; `*` allows any.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `300`).
    pub request_timeout_secs: u64,
    /// Upstream platform settings.
    pub vellum: VellumSettings,
    /// Shared-tier time-to-live, from `STATS_TTL_HOURS` (default: `24`).
    pub stats_ttl: chrono::Duration,
    /// Logo image sent with swag orders that carry none.
    pub default_swag_logo_url: String,
}

/// Connection settings for the upstream workflow platform.
#[derive(Debug, Clone)]
pub struct VellumSettings {
    /// `None` when `VELLUM_API_KEY` is unset; every proxy call then fails.
    pub api_key: Option<String>,
    pub predict_url: String,
    pub api_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub count_endpoint: ExecutionCountEndpoint,
}

impl VellumSettings {
    /// Client configuration, if a key is configured.
    pub fn api_config(&self) -> Option<VellumApiConfig> {
        let api_key = self.api_key.clone()?;
        Some(VellumApiConfig {
            api_key,
            predict_url: self.predict_url.trim_end_matches('/').to_string(),
            api_url: self.api_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryConfig {
                max_retries: self.max_retries,
                ..RetryConfig::default()
            },
            count_endpoint: self.count_endpoint,
        })
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                     |
    /// |-------------------------|-----------------------------|
    /// | `HOST`                  | `0.0.0.0`                   |
    /// | `PORT`                  | `3000`                      |
    /// | `CORS_ORIGINS`          | `*`                         |
    /// | `REQUEST_TIMEOUT_SECS`  | `300`                       |
    /// | `VELLUM_API_KEY`        | unset                       |
    /// | `VELLUM_PREDICT_URL`    | `https://predict.vellum.ai` |
    /// | `VELLUM_API_URL`        | `https://api.vellum.ai`     |
    /// | `VELLUM_TIMEOUT_SECS`   | `120`                       |
    /// | `VELLUM_MAX_RETRIES`    | `1`                         |
    /// | `VELLUM_STATS_ENDPOINT` | `executions`                |
    /// | `STATS_TTL_HOURS`       | `24`                        |
    /// | `DEFAULT_SWAG_LOGO_URL` | bundled logo asset          |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "300".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let api_key = std::env::var("VELLUM_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let timeout_secs: u64 = std::env::var("VELLUM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".into())
            .parse()
            .expect("VELLUM_TIMEOUT_SECS must be a valid u64");

        let max_retries: u32 = std::env::var("VELLUM_MAX_RETRIES")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("VELLUM_MAX_RETRIES must be a valid u32");

        let count_endpoint: ExecutionCountEndpoint = std::env::var("VELLUM_STATS_ENDPOINT")
            .unwrap_or_else(|_| "executions".into())
            .parse()
            .unwrap_or_else(|e| panic!("Invalid VELLUM_STATS_ENDPOINT: {e}"));

        let stats_ttl_hours: i64 = std::env::var("STATS_TTL_HOURS")
            .unwrap_or_else(|_| STATS_TTL_HOURS.to_string())
            .parse()
            .expect("STATS_TTL_HOURS must be a valid i64");
        let stats_ttl = stats_ttl_from_hours(stats_ttl_hours).expect("STATS_TTL_HOURS out of range");

        let default_swag_logo_url = std::env::var("DEFAULT_SWAG_LOGO_URL")
            .unwrap_or_else(|_| DEFAULT_SWAG_LOGO_URL.into());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            vellum: VellumSettings {
                api_key,
                predict_url: std::env::var("VELLUM_PREDICT_URL")
                    .unwrap_or_else(|_| DEFAULT_PREDICT_URL.into()),
                api_url: std::env::var("VELLUM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into()),
                timeout_secs,
                max_retries,
                count_endpoint,
            },
            stats_ttl,
            default_swag_logo_url,
        }
    }

    /// Whether `CORS_ORIGINS` admits any origin.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}

/// Hours as a TTL; `None` for negative or unrepresentable values.
fn stats_ttl_from_hours(hours: i64) -> Option<chrono::Duration> {
    if hours < 0 {
        return None;
    }
    chrono::Duration::try_hours(hours)
}
