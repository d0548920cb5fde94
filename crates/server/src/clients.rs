//! Open application sessions and shown notifications.
//!
//! Stands in for the browser's client list: the controller claims sessions
//! on activation, focuses or opens them on notification clicks, and a
//! waiting generation is promoted once the last session closes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

pub type ClientId = u64;

/// An open window of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClientSession {
    pub id: ClientId,
    pub url: String,
    /// Tag of the generation controlling this session, if any.
    pub controller: Option<String>,
    pub focused: bool,
    pub opened_at: String,
}

/// A notification currently on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Notification {
    pub id: u64,
    pub title: String,
    pub body: String,
    /// Where a click should take the user.
    pub target: String,
    pub shown_at: String,
}

#[derive(Default)]
struct Inner {
    sessions: BTreeMap<ClientId, ClientSession>,
    notifications: BTreeMap<u64, Notification>,
}

/// Registry of sessions and notifications, shared by all controllers.
#[derive(Default)]
pub struct ClientRegistry {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Open a new focused session at `url`.
    pub async fn open_window(&self, url: &str, controller: Option<&str>) -> ClientSession {
        let session = ClientSession {
            id: self.next_id(),
            url: url.to_string(),
            controller: controller.map(str::to_string),
            focused: true,
            opened_at: Utc::now().to_rfc3339(),
        };
        let mut inner = self.inner.write().await;
        for other in inner.sessions.values_mut() {
            other.focused = false;
        }
        inner.sessions.insert(session.id, session.clone());
        tracing::debug!(client = session.id, url, "opened client session");
        session
    }

    /// Focus a session, unfocusing every other one.
    pub async fn focus(&self, id: ClientId) -> Option<ClientSession> {
        let mut inner = self.inner.write().await;
        if !inner.sessions.contains_key(&id) {
            return None;
        }
        for session in inner.sessions.values_mut() {
            session.focused = session.id == id;
        }
        inner.sessions.get(&id).cloned()
    }

    pub async fn find_by_url(&self, url: &str) -> Option<ClientSession> {
        let inner = self.inner.read().await;
        inner.sessions.values().find(|s| s.url == url).cloned()
    }

    pub async fn close(&self, id: ClientId) -> Option<ClientSession> {
        self.inner.write().await.sessions.remove(&id)
    }

    /// Put every open session under `tag`. Returns how many were claimed.
    pub async fn claim(&self, tag: &str) -> usize {
        let mut inner = self.inner.write().await;
        for session in inner.sessions.values_mut() {
            session.controller = Some(tag.to_string());
        }
        inner.sessions.len()
    }

    pub async fn sessions(&self) -> Vec<ClientSession> {
        self.inner.read().await.sessions.values().cloned().collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sessions.is_empty()
    }

    pub async fn show_notification(&self, title: String, body: String, target: String) -> Notification {
        let notification = Notification { id: self.next_id(), title, body, target, shown_at: Utc::now().to_rfc3339() };
        self.inner
            .write()
            .await
            .notifications
            .insert(notification.id, notification.clone());
        notification
    }

    pub async fn close_notification(&self, id: u64) -> Option<Notification> {
        self.inner.write().await.notifications.remove(&id)
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.inner.read().await.notifications.values().cloned().collect()
    }
}
