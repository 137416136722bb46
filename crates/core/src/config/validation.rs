//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `fetch_timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` or `cache_version` is empty
    /// - `cache_version` contains characters unfit for a tier name
    /// - `upstream_origin` is not an http/https origin
    /// - a shell route does not start with `/`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.fetch_timeout_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "fetch_timeout_ms".into(),
                reason: "must be at least 100ms".into(),
            });
        }
        if self.fetch_timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "fetch_timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.cache_version.is_empty() {
            return Err(ConfigError::Invalid { field: "cache_version".into(), reason: "must not be empty".into() });
        }
        if !self
            .cache_version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
        {
            return Err(ConfigError::Invalid {
                field: "cache_version".into(),
                reason: "must contain only alphanumerics, '.', '_' or '-'".into(),
            });
        }

        if !self.upstream_origin.starts_with("http://") && !self.upstream_origin.starts_with("https://") {
            return Err(ConfigError::Invalid {
                field: "upstream_origin".into(),
                reason: "must be an http:// or https:// origin".into(),
            });
        }

        if self.shell_routes.is_empty() {
            tracing::warn!("shell_routes is empty; navigation fallback will have nothing to prime");
        }
        for route in &self.shell_routes {
            if !route.starts_with('/') {
                return Err(ConfigError::Invalid {
                    field: "shell_routes".into(),
                    reason: format!("route {route:?} must start with '/'"),
                });
            }
        }

        Ok(())
    }
}
