//! sw_push, sw_notification_click and sw_sync tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use offcache_client::Fetcher;
use offcache_core::CacheStore;

use super::json_result;
use crate::registration::Registration;

/// Parameters for the sw_push tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PushParams {
    /// Raw push payload, normally JSON `{title, body, url}`. Anything else
    /// falls back to the default notification.
    #[serde(default)]
    pub payload: Option<String>,
}

/// Parameters for the sw_notification_click tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotificationClickParams {
    /// Id of the shown notification.
    pub id: u64,
}

/// Parameters for the sw_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncParams {
    /// Background sync tag.
    pub tag: String,
}

/// Output from the sw_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncOutput {
    pub tag: String,
    pub handled: bool,
}

/// Implementation of the sw_push tool.
pub async fn push_impl<S: CacheStore, F: Fetcher>(
    registration: &Registration<S, F>, params: PushParams,
) -> Result<CallToolResult, McpError> {
    let notification = registration.push(params.payload.as_deref().map(str::as_bytes)).await?;
    json_result(&notification)
}

/// Implementation of the sw_notification_click tool.
pub async fn notification_click_impl<S: CacheStore, F: Fetcher>(
    registration: &Registration<S, F>, params: NotificationClickParams,
) -> Result<CallToolResult, McpError> {
    let session = registration.notification_click(params.id).await?;
    json_result(&session)
}

/// Implementation of the sw_sync tool.
pub async fn sync_impl<S: CacheStore, F: Fetcher>(
    registration: &Registration<S, F>, params: SyncParams,
) -> Result<CallToolResult, McpError> {
    let handled = registration.sync(&params.tag).await?;
    json_result(&SyncOutput { tag: params.tag, handled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ClientSession, Notification};
    use crate::controller::events::{DEFAULT_BODY, DEFAULT_TITLE};
    use crate::testing;
    use crate::tools::test_support::{output, registration};

    #[tokio::test]
    async fn test_push_then_click() {
        let (reg, _) = registration(true);
        reg.register(testing::version("v1")).await.unwrap();

        let params = PushParams { payload: Some(r#"{"title":"Inbox","url":"/app/inbox"}"#.into()) };
        let shown: Notification = output(&push_impl(&reg, params).await.unwrap());
        assert_eq!(shown.title, "Inbox");
        assert_eq!(shown.body, DEFAULT_BODY);

        let click = NotificationClickParams { id: shown.id };
        let session: ClientSession = output(&notification_click_impl(&reg, click).await.unwrap());
        assert_eq!(session.url, "https://example.com/app/inbox");
        assert_eq!(session.controller.as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_push_without_payload() {
        let (reg, _) = registration(true);
        reg.register(testing::version("v1")).await.unwrap();

        let shown: Notification = output(&push_impl(&reg, PushParams::default()).await.unwrap());
        assert_eq!(shown.title, DEFAULT_TITLE);
        assert_eq!(shown.target, "/app/");
    }

    #[tokio::test]
    async fn test_events_require_active_version() {
        let (reg, _) = registration(true);
        let err = push_impl(&reg, PushParams::default()).await.unwrap_err();
        assert_eq!(err.code.0, -32021);
    }

    #[tokio::test]
    async fn test_click_unknown_id() {
        let (reg, _) = registration(true);
        reg.register(testing::version("v1")).await.unwrap();
        let err = notification_click_impl(&reg, NotificationClickParams { id: 99 }).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
    }

    #[tokio::test]
    async fn test_sync_tags() {
        let (reg, _) = registration(true);
        reg.register(testing::version("v1")).await.unwrap();

        let out: SyncOutput = output(&sync_impl(&reg, SyncParams { tag: "sync-messages".into() }).await.unwrap());
        assert!(out.handled);
        let out: SyncOutput = output(&sync_impl(&reg, SyncParams { tag: "other".into() }).await.unwrap());
        assert!(!out.handled);
    }
}
