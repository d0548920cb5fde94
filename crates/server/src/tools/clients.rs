//! sw_open_client and sw_close_client tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offcache_client::{Fetcher, resolve};
use offcache_core::{CacheStore, Error};

use super::json_result;
use crate::clients::{ClientId, ClientSession};
use crate::registration::Registration;

/// Parameters for the sw_open_client tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OpenClientParams {
    /// Absolute URL, or a path resolved against the application origin.
    pub url: String,
}

/// Parameters for the sw_close_client tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CloseClientParams {
    pub id: ClientId,
}

/// Output from the sw_close_client tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CloseClientOutput {
    pub closed: ClientSession,
    /// Tag of a waiting version promoted because no sessions remain.
    pub promoted: Option<String>,
}

/// Implementation of the sw_open_client tool.
pub async fn open_impl<S: CacheStore, F: Fetcher>(
    registration: &Registration<S, F>, params: OpenClientParams,
) -> Result<CallToolResult, McpError> {
    let url = resolve(&registration.settings().origin, &params.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    let session = registration.open_client(url.as_str()).await;
    json_result(&session)
}

/// Implementation of the sw_close_client tool.
pub async fn close_impl<S: CacheStore, F: Fetcher>(
    registration: &Registration<S, F>, params: CloseClientParams,
) -> Result<CallToolResult, McpError> {
    let (closed, promoted) = registration.close_client(params.id).await?;
    let closed = closed.ok_or_else(|| Error::InvalidInput(format!("no client with id {}", params.id)))?;
    json_result(&CloseClientOutput { closed, promoted })
}
