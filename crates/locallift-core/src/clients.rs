//! Pages and workers the engine can control and message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    Window,
    Worker,
}

/// Snapshot of a registered client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: Uuid,
    pub url: String,
    pub kind: ClientKind,
    /// Set once the active worker claims the client.
    pub controlled: bool,
    pub focused: bool,
}

/// Messages posted from the worker to a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    SyncCompleted { timestamp: DateTime<Utc> },
}

struct Entry {
    client: Client,
    sender: mpsc::UnboundedSender<ClientMessage>,
    /// Held for windows opened by the worker until the host attaches.
    pending: Option<mpsc::UnboundedReceiver<ClientMessage>>,
}

#[derive(Default)]
pub struct ClientRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut Vec<Entry>) -> T) -> Option<T> {
        match self.entries.lock() {
            Ok(mut entries) => Some(f(&mut entries)),
            Err(e) => {
                warn!("Client registry lock poisoned: {}", e);
                None
            }
        }
    }

    /// Register a client and return its id and message channel.
    pub fn register(
        &self,
        url: impl Into<String>,
        kind: ClientKind,
    ) -> (Uuid, mpsc::UnboundedReceiver<ClientMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let client = Client {
            id: Uuid::new_v4(),
            url: url.into(),
            kind,
            controlled: false,
            focused: false,
        };
        let id = client.id;
        debug!("Registered {:?} client {} at {}", kind, id, client.url);
        self.with_entries(|entries| {
            entries.push(Entry {
                client,
                sender,
                pending: None,
            })
        });
        (id, receiver)
    }

    pub fn unregister(&self, id: Uuid) -> bool {
        self.with_entries(|entries| {
            let before = entries.len();
            entries.retain(|e| e.client.id != id);
            entries.len() != before
        })
        .unwrap_or(false)
    }

    /// Take control of every registered client. Returns how many were claimed.
    pub fn claim(&self) -> usize {
        self.with_entries(|entries| {
            for entry in entries.iter_mut() {
                entry.client.controlled = true;
            }
            entries.len()
        })
        .unwrap_or(0)
    }

    /// Registered clients, optionally filtered by kind, in registration order.
    pub fn match_all(&self, kind: Option<ClientKind>) -> Vec<Client> {
        self.with_entries(|entries| {
            entries
                .iter()
                .filter(|e| kind.map_or(true, |k| e.client.kind == k))
                .map(|e| e.client.clone())
                .collect()
        })
        .unwrap_or_default()
    }

    pub fn get(&self, id: Uuid) -> Option<Client> {
        self.with_entries(|entries| {
            entries
                .iter()
                .find(|e| e.client.id == id)
                .map(|e| e.client.clone())
        })
        .flatten()
    }

    /// Give focus to one window; every other client loses it.
    pub fn focus(&self, id: Uuid) -> bool {
        self.with_entries(|entries| {
            if !entries.iter().any(|e| e.client.id == id) {
                return false;
            }
            for entry in entries.iter_mut() {
                entry.client.focused = entry.client.id == id;
            }
            true
        })
        .unwrap_or(false)
    }

    /// Open a new focused, controlled window client.
    ///
    /// Its message channel is held until [`ClientRegistry::attach`] is called.
    pub fn open_window(&self, url: impl Into<String>) -> Uuid {
        let (sender, receiver) = mpsc::unbounded_channel();
        let client = Client {
            id: Uuid::new_v4(),
            url: url.into(),
            kind: ClientKind::Window,
            controlled: true,
            focused: true,
        };
        let id = client.id;
        debug!("Opened window client {} at {}", id, client.url);
        self.with_entries(|entries| {
            for entry in entries.iter_mut() {
                entry.client.focused = false;
            }
            entries.push(Entry {
                client,
                sender,
                pending: Some(receiver),
            });
        });
        id
    }

    /// Take the message channel of a window opened by the worker.
    pub fn attach(&self, id: Uuid) -> Option<mpsc::UnboundedReceiver<ClientMessage>> {
        self.with_entries(|entries| {
            entries
                .iter_mut()
                .find(|e| e.client.id == id)
                .and_then(|e| e.pending.take())
        })
        .flatten()
    }

    pub fn post_message(&self, id: Uuid, message: ClientMessage) -> bool {
        self.with_entries(|entries| {
            entries
                .iter()
                .find(|e| e.client.id == id)
                .map(|e| e.sender.send(message).is_ok())
                .unwrap_or(false)
        })
        .unwrap_or(false)
    }

    /// Post `message` to every client of `kind`. Returns the number delivered.
    pub fn broadcast(&self, kind: ClientKind, message: &ClientMessage) -> usize {
        self.with_entries(|entries| {
            entries
                .iter()
                .filter(|e| e.client.kind == kind)
                .filter(|e| match e.sender.send(message.clone()) {
                    Ok(()) => true,
                    Err(_) => {
                        debug!("Client {} is gone, message dropped", e.client.id);
                        false
                    }
                })
                .count()
        })
        .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serializes_with_type_tag() {
        let message = ClientMessage::SyncCompleted {
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "SYNC_COMPLETED");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_claim_marks_every_client_controlled() {
        let registry = ClientRegistry::new();
        let _a = registry.register("https://app.test/", ClientKind::Window);
        let _b = registry.register("https://app.test/worker.js", ClientKind::Worker);

        assert_eq!(registry.claim(), 2);
        assert!(registry.match_all(None).iter().all(|c| c.controlled));
        assert_eq!(registry.match_all(Some(ClientKind::Window)).len(), 1);
    }

    #[test]
    fn test_focus_is_exclusive() {
        let registry = ClientRegistry::new();
        let (a, _rx_a) = registry.register("https://app.test/a", ClientKind::Window);
        let (b, _rx_b) = registry.register("https://app.test/b", ClientKind::Window);

        assert!(registry.focus(a));
        assert!(registry.focus(b));
        assert!(!registry.get(a).unwrap().focused);
        assert!(registry.get(b).unwrap().focused);
        assert!(!registry.focus(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_windows_only() {
        let registry = ClientRegistry::new();
        let (_, mut window_rx) = registry.register("https://app.test/", ClientKind::Window);
        let (_, mut worker_rx) = registry.register("https://app.test/w.js", ClientKind::Worker);
        let (_, dropped_rx) = registry.register("https://app.test/closed", ClientKind::Window);
        drop(dropped_rx);

        let message = ClientMessage::SyncCompleted {
            timestamp: Utc::now(),
        };
        assert_eq!(registry.broadcast(ClientKind::Window, &message), 1);
        assert_eq!(window_rx.recv().await, Some(message));
        assert!(worker_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_opened_window_receives_after_attach() {
        let registry = ClientRegistry::new();
        let id = registry.open_window("https://app.test/dashboard");

        let client = registry.get(id).unwrap();
        assert!(client.controlled && client.focused);

        let message = ClientMessage::SyncCompleted {
            timestamp: Utc::now(),
        };
        assert!(registry.post_message(id, message.clone()));
        let mut rx = registry.attach(id).unwrap();
        assert!(registry.attach(id).is_none());
        assert_eq!(rx.recv().await, Some(message));
    }
}
