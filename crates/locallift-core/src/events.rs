//! Typed event subscription.
//!
//! Handlers run synchronously on the emitting task, in subscription order.
//! A handler subscribed while an event is being delivered does not receive
//! that event. Unsubscribing during delivery takes effect for the next event.

use crate::lifecycle::InstallReport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

pub struct EventBus<E> {
    handlers: RwLock<Vec<(SubscriptionId, Handler<E>)>>,
    next_id: AtomicU64,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        match self.handlers.write() {
            Ok(mut handlers) => handlers.push((id, Arc::new(handler))),
            Err(e) => warn!("Event bus lock poisoned, dropping subscription: {}", e),
        }
        id
    }

    /// Remove a handler. Returns `false` if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Ok(mut handlers) = self.handlers.write() else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn emit(&self, event: &E) {
        // Snapshot so handlers may (un)subscribe without deadlocking
        let snapshot: Vec<Handler<E>> = match self.handlers.read() {
            Ok(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            Err(_) => return,
        };
        for handler in snapshot {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }
}

/// Events emitted by the service worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    InstallStarted { version: String },
    Installed { report: InstallReport },
    Activated { deleted: Vec<String>, claimed: usize },
    NamespaceDeleted { name: String },
    DynamicEvicted { key: String },
    NotificationShown { title: String },
    PostShown { id: String },
    SyncCompleted { tag: String, notified: usize },
    Redundant,
}
