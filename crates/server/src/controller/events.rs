//! Push, notification click and background sync events.

use serde_json::Value;

use offcache_client::Fetcher;
use offcache_core::{CacheStore, Error};

use super::CacheController;
use crate::clients::{ClientRegistry, ClientSession, Notification};

pub const DEFAULT_TITLE: &str = "New message";
pub const DEFAULT_BODY: &str = "You have a new notification";

/// Decoded push payload. Absent fields fall back to defaults at display time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushMessage {
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
}

impl PushMessage {
    /// Lenient decode: anything that is not a JSON object yields an empty
    /// message, and non-string fields are ignored individually.
    pub fn parse(payload: Option<&[u8]>) -> Self {
        let Some(bytes) = payload else {
            return Self::default();
        };
        let value: Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "push payload is not JSON; using defaults");
                return Self::default();
            }
        };
        let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
        Self { title: field("title"), body: field("body"), url: field("url") }
    }
}

impl<S: CacheStore, F: Fetcher> CacheController<S, F> {
    /// Show a notification for a push payload.
    pub async fn on_push(&self, payload: Option<&[u8]>, clients: &ClientRegistry) -> Notification {
        let message = PushMessage::parse(payload);
        let notification = clients
            .show_notification(
                message.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
                message.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
                message.url.unwrap_or_else(|| self.settings.classifier.scope().to_string()),
            )
            .await;
        tracing::info!(tag = %self.version.tag, notification = notification.id, "push notification shown");
        notification
    }

    /// Close the notification and bring the user to its target: focus a
    /// session already there, or open a new one.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if no notification with that id is showing.
    pub async fn on_notification_click(&self, id: u64, clients: &ClientRegistry) -> Result<ClientSession, Error> {
        let notification = clients
            .close_notification(id)
            .await
            .ok_or_else(|| Error::InvalidInput(format!("no notification with id {id}")))?;

        let target = self.resolve_target(&notification.target);
        if let Some(existing) = clients.find_by_url(&target).await
            && let Some(focused) = clients.focus(existing.id).await
        {
            return Ok(focused);
        }

        Ok(clients.open_window(&target, Some(&self.version.tag)).await)
    }

    /// Background sync hook. Returns whether `tag` was recognised.
    pub async fn on_sync(&self, tag: &str) -> bool {
        if tag != self.settings.sync_tag {
            tracing::debug!(tag, "ignoring unknown sync tag");
            return false;
        }
        self.sync_pending().await;
        true
    }

    /// Flush point for queued outbound messages. Nothing is queued yet; the
    /// hook only records that a sync was requested.
    async fn sync_pending(&self) {
        tracing::info!(tag = %self.version.tag, sync_tag = %self.settings.sync_tag, "background sync requested");
    }
}
