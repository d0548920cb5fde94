//! sw_register, sw_skip_waiting and sw_status tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offcache_client::Fetcher;
use offcache_core::{CacheStore, Error};

use super::json_result;
use crate::controller::WorkerVersion;
use crate::registration::Registration;

/// Parameters for the sw_register tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RegisterParams {
    /// Generation tag of the version to deploy (default: configured tag).
    #[serde(default)]
    pub tag: Option<String>,

    /// Paths to seed at install time (default: configured manifest).
    #[serde(default)]
    pub manifest: Option<Vec<String>>,
}

/// Output from the sw_skip_waiting tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SkipWaitingOutput {
    /// Tag of the promoted version, if one was waiting.
    pub promoted: Option<String>,
}

/// Implementation of the sw_register tool.
pub async fn register_impl<S: CacheStore, F: Fetcher>(
    registration: &Registration<S, F>, defaults: &WorkerVersion, params: RegisterParams,
) -> Result<CallToolResult, McpError> {
    let tag = params.tag.unwrap_or_else(|| defaults.tag.clone());
    if tag.trim().is_empty() || tag.chars().any(char::is_whitespace) {
        return Err(Error::InvalidInput(format!("invalid generation tag: {tag:?}")).into());
    }

    let manifest = params.manifest.unwrap_or_else(|| defaults.manifest.clone());
    if manifest.is_empty() {
        return Err(Error::InvalidInput("manifest cannot be empty".into()).into());
    }

    let outcome = registration.register(WorkerVersion { tag, manifest }).await?;
    json_result(&outcome)
}

/// Implementation of the sw_skip_waiting tool.
pub async fn skip_waiting_impl<S: CacheStore, F: Fetcher>(
    registration: &Registration<S, F>,
) -> Result<CallToolResult, McpError> {
    let promoted = registration.skip_waiting().await?;
    json_result(&SkipWaitingOutput { promoted })
}

/// Implementation of the sw_status tool.
pub async fn status_impl<S: CacheStore, F: Fetcher>(
    registration: &Registration<S, F>,
) -> Result<CallToolResult, McpError> {
    json_result(&registration.status().await?)
}
