// Configuration.
//
// All options arrive from the CLI or environment (see main.rs) and are
// validated once at startup: a missing endpoint, agent id, or origin list
// is fatal before any turn is processed.

use std::time::Duration;

use axum::http::HeaderValue;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set and non-empty")]
    MissingRequired(&'static str),

    #[error("invalid CORS origin \"{0}\"")]
    InvalidOrigin(String),
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream project endpoint, without a trailing slash.
    pub project_endpoint: String,
    /// Agent identifier sent as the `model` of every upstream request.
    pub agent_id: String,
    /// Browser origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    /// Overall bound on one outbound streaming call.
    pub upstream_timeout: Duration,
}

impl Config {
    /// Validate and normalize raw option values.
    pub fn new(
        project_endpoint: &str,
        agent_id: &str,
        cors_origins: &str,
        upstream_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let project_endpoint = project_endpoint.trim().trim_end_matches('/').to_string();
        if project_endpoint.is_empty() {
            return Err(ConfigError::MissingRequired("PROJECT_ENDPOINT"));
        }

        let agent_id = agent_id.trim().to_string();
        if agent_id.is_empty() {
            return Err(ConfigError::MissingRequired("AGENT_ID"));
        }

        let allowed_origins: Vec<String> = cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();
        if allowed_origins.is_empty() {
            return Err(ConfigError::MissingRequired("CORS_ORIGINS"));
        }
        for origin in &allowed_origins {
            if origin.parse::<HeaderValue>().is_err() {
                return Err(ConfigError::InvalidOrigin(origin.clone()));
            }
        }

        Ok(Self {
            project_endpoint,
            agent_id,
            allowed_origins,
            upstream_timeout,
        })
    }
}
