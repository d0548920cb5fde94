//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use offcache_client::FetchClient;
use offcache_core::CacheDb;

use crate::controller::WorkerVersion;
use crate::registration::Registration;
use crate::tools::{
    CloseClientParams, FetchParams, NotificationClickParams, OpenClientParams, PushParams, RegisterParams, SyncParams,
    clients, events, fetch, lifecycle,
};

pub type AppRegistration = Registration<CacheDb, FetchClient>;

/// The main MCP server handler for offcache.
#[derive(Clone)]
pub struct OffcacheServer {
    registration: Arc<AppRegistration>,
    /// Version deployed when sw_register omits tag or manifest.
    defaults: Arc<WorkerVersion>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl OffcacheServer {
    /// Create a new server handler.
    pub fn new(registration: Arc<AppRegistration>, defaults: WorkerVersion) -> Self {
        Self { registration, defaults: Arc::new(defaults), tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Install a version's cache generation from its manifest and activate it (or park it as waiting). Defaults to the configured tag and manifest."
    )]
    async fn sw_register(&self, params: Parameters<RegisterParams>) -> Result<CallToolResult, McpError> {
        lifecycle::register_impl(&self.registration, &self.defaults, params.0).await
    }

    #[tool(description = "Activate the waiting version now, deleting older cache generations.")]
    async fn sw_skip_waiting(&self) -> Result<CallToolResult, McpError> {
        lifecycle::skip_waiting_impl(&self.registration).await
    }

    #[tool(
        description = "Fetch a URL through the active version. Scripts and data are network-first; shell and static assets are cache-first with the shell as offline fallback."
    )]
    async fn sw_fetch(&self, params: Parameters<FetchParams>) -> Result<CallToolResult, McpError> {
        fetch::fetch_impl(&self.registration, params.0).await
    }

    #[tool(description = "Deliver a push message. Payload is optional JSON {title, body, url}.")]
    async fn sw_push(&self, params: Parameters<PushParams>) -> Result<CallToolResult, McpError> {
        events::push_impl(&self.registration, params.0).await
    }

    #[tool(description = "Click a shown notification: focus a session at its URL or open a new one.")]
    async fn sw_notification_click(&self, params: Parameters<NotificationClickParams>) -> Result<CallToolResult, McpError> {
        events::notification_click_impl(&self.registration, params.0).await
    }

    #[tool(description = "Fire a background sync event for a tag.")]
    async fn sw_sync(&self, params: Parameters<SyncParams>) -> Result<CallToolResult, McpError> {
        events::sync_impl(&self.registration, params.0).await
    }

    #[tool(description = "Open an application session at a URL; it is controlled by the active version.")]
    async fn sw_open_client(&self, params: Parameters<OpenClientParams>) -> Result<CallToolResult, McpError> {
        clients::open_impl(&self.registration, params.0).await
    }

    #[tool(description = "Close an application session. Closing the last one activates a waiting version.")]
    async fn sw_close_client(&self, params: Parameters<CloseClientParams>) -> Result<CallToolResult, McpError> {
        clients::close_impl(&self.registration, params.0).await
    }

    #[tool(description = "Show active and waiting versions, stored generations, sessions and notifications.")]
    async fn sw_status(&self) -> Result<CallToolResult, McpError> {
        lifecycle::status_impl(&self.registration).await
    }
}

impl ServerHandler for OffcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "offcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
