//! MCP tool implementations.
//!
//! Every tool drives the shared [`Registration`](crate::registration::Registration)
//! and answers with pretty-printed JSON in a single text block.

pub mod clients;
pub mod events;
pub mod fetch;
pub mod lifecycle;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use offcache_core::Error;

pub use clients::{CloseClientParams, OpenClientParams};
pub use events::{NotificationClickParams, PushParams, SyncParams};
pub use fetch::FetchParams;
pub use lifecycle::RegisterParams;

/// Serialize a tool output as the single text block of a successful result.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
