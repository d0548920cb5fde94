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

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `origin` is not a bare http(s) origin
    /// - `scope` does not start and end with `/`
    /// - `generation_tag` is empty or contains whitespace
    /// - `install_manifest` is empty or holds a path not under `/`
    /// - `worker_script` is empty or contains `/`
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        let origin = self.origin_url()?;
        if origin.path() != "/" || origin.query().is_some() {
            return Err(invalid("origin", "must not carry a path or query"));
        }

        if !self.scope.starts_with('/') || !self.scope.ends_with('/') {
            return Err(invalid("scope", "must start and end with '/'"));
        }

        if self.generation_tag.is_empty() {
            return Err(invalid("generation_tag", "must not be empty"));
        }
        if self.generation_tag.chars().any(char::is_whitespace) {
            return Err(invalid("generation_tag", "must not contain whitespace"));
        }

        if self.install_manifest.is_empty() {
            return Err(invalid("install_manifest", "must list at least one path"));
        }
        if let Some(path) = self.install_manifest.iter().find(|p| !p.starts_with('/')) {
            return Err(invalid("install_manifest", format!("path must be absolute: {path}")));
        }
        if !self.install_manifest.iter().any(|p| p.starts_with(&self.scope)) {
            tracing::warn!(scope = %self.scope, "no install_manifest path falls under scope; offline fallback will be empty");
        }

        if self.worker_script.is_empty() || self.worker_script.contains('/') {
            return Err(invalid("worker_script", "must be a bare file name"));
        }

        if self.sync_tag.is_empty() {
            return Err(invalid("sync_tag", "must not be empty"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        Ok(())
    }
}
