//! Push, notification click and background sync handlers.

use crate::clients::{ClientKind, ClientMessage, ClientRegistry};
use crate::events::{EventBus, WorkerEvent};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Sync tag that flushes data queued while offline.
pub const SYNC_PENDING_DATA: &str = "sync-pending-data";

/// Where a notification click leads when the payload names no URL.
pub const DEFAULT_CLICK_TARGET: &str = "/dashboard";

/// Notifications kept on display; older ones are closed first.
pub const MAX_SHOWN_NOTIFICATIONS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub data: Value,
    pub actions: Vec<NotificationAction>,
    pub vibrate: Vec<u32>,
}

impl NotificationOptions {
    pub const DEFAULT_TITLE: &'static str = "LocalLift Notification";
    pub const DEFAULT_BODY: &'static str = "New update from LocalLift";
    pub const DEFAULT_ICON: &'static str = "/img/logo-192.png";
    pub const DEFAULT_BADGE: &'static str = "/img/badge.png";
    pub const DEFAULT_VIBRATE: [u32; 3] = [100, 50, 100];
}

impl Default for NotificationOptions {
    fn default() -> Self {
        Self {
            body: Self::DEFAULT_BODY.to_string(),
            icon: Self::DEFAULT_ICON.to_string(),
            badge: Self::DEFAULT_BADGE.to_string(),
            data: Value::Object(Default::default()),
            actions: Vec::new(),
            vibrate: Self::DEFAULT_VIBRATE.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub options: NotificationOptions,
}

impl Notification {
    /// Build a notification from a push payload.
    ///
    /// JSON payloads may set `title`, `body`, `data` and `actions`; anything
    /// else is used verbatim as the body.
    pub fn from_push_payload(payload: &[u8]) -> Self {
        #[derive(Deserialize)]
        struct PushPayload {
            title: Option<String>,
            body: Option<String>,
            data: Option<Value>,
            actions: Option<Vec<NotificationAction>>,
        }

        let mut title = NotificationOptions::DEFAULT_TITLE.to_string();
        let mut options = NotificationOptions::default();

        match serde_json::from_slice::<PushPayload>(payload) {
            Ok(parsed) => {
                if let Some(t) = parsed.title {
                    title = t;
                }
                if let Some(body) = parsed.body {
                    options.body = body;
                }
                if let Some(data) = parsed.data {
                    options.data = data;
                }
                if let Some(actions) = parsed.actions {
                    options.actions = actions;
                }
            }
            Err(_) if !payload.is_empty() => {
                options.body = String::from_utf8_lossy(payload).into_owned();
            }
            Err(_) => {}
        }

        Self {
            id: Uuid::new_v4(),
            title,
            options,
        }
    }

    /// `data.url`, or the dashboard.
    pub fn click_target(&self) -> &str {
        self.options
            .data
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CLICK_TARGET)
    }
}

/// What a notification click did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An existing window showing the target was focused.
    Focused(Uuid),
    /// A new window was opened at the target.
    Opened(Uuid),
}

pub struct RuntimeHooks {
    origin: Url,
    clients: Arc<ClientRegistry>,
    events: Arc<EventBus<WorkerEvent>>,
    shown: Mutex<Vec<Notification>>,
}

impl RuntimeHooks {
    pub fn new(
        origin: Url,
        clients: Arc<ClientRegistry>,
        events: Arc<EventBus<WorkerEvent>>,
    ) -> Self {
        Self {
            origin,
            clients,
            events,
            shown: Mutex::new(Vec::new()),
        }
    }

    /// Show a notification for a push message.
    pub fn push(&self, payload: &[u8]) -> Notification {
        let notification = Notification::from_push_payload(payload);
        info!("Showing notification: {}", notification.title);

        match self.shown.lock() {
            Ok(mut shown) => {
                if shown.len() >= MAX_SHOWN_NOTIFICATIONS {
                    let oldest = shown.remove(0);
                    debug!("Closing oldest notification {}", oldest.id);
                }
                shown.push(notification.clone());
            }
            Err(e) => warn!("Notification list lock poisoned: {}", e),
        }
        self.events.emit(&WorkerEvent::NotificationShown {
            title: notification.title.clone(),
        });
        notification
    }

    /// Notifications shown and not yet clicked.
    pub fn notifications(&self) -> Vec<Notification> {
        self.shown.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Dismiss a notification without acting on it.
    pub fn close(&self, id: Uuid) -> bool {
        let Ok(mut shown) = self.shown.lock() else {
            return false;
        };
        let before = shown.len();
        shown.retain(|n| n.id != id);
        shown.len() != before
    }

    /// Close the notification and bring its target into view.
    ///
    /// Returns `None` for an unknown notification.
    pub fn notification_click(&self, id: Uuid) -> Option<ClickOutcome> {
        let notification = {
            let mut shown = self.shown.lock().ok()?;
            let index = shown.iter().position(|n| n.id == id)?;
            shown.remove(index)
        };
        let target = notification.click_target();

        let existing = self
            .clients
            .match_all(Some(ClientKind::Window))
            .into_iter()
            .find(|c| c.url.contains(target));
        if let Some(client) = existing {
            if self.clients.focus(client.id) {
                debug!("Focused window {} for {}", client.id, target);
                return Some(ClickOutcome::Focused(client.id));
            }
        }

        let url = self
            .origin
            .join(target)
            .map(String::from)
            .unwrap_or_else(|_| target.to_string());
        let id = self.clients.open_window(url);
        debug!("Opened window {} for {}", id, target);
        Some(ClickOutcome::Opened(id))
    }

    /// Handle a background sync. Returns the number of windows notified.
    pub fn sync(&self, tag: &str) -> usize {
        if tag != SYNC_PENDING_DATA {
            debug!("Ignoring sync tag {}", tag);
            return 0;
        }

        let message = ClientMessage::SyncCompleted {
            timestamp: Utc::now(),
        };
        let notified = self.clients.broadcast(ClientKind::Window, &message);
        info!("Sync {} completed, notified {} windows", tag, notified);
        self.events.emit(&WorkerEvent::SyncCompleted {
            tag: tag.to_string(),
            notified,
        });
        notified
    }
}
