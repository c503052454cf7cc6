//! Status event infrastructure.
//!
//! The core never touches presentation internals directly; it publishes
//! `StatusEvent`s through an `EventBus` and lets the host's display layer
//! subscribe. Events serialize to camelCase-tagged JSON for host-side
//! consumption.

use crate::storage::StorageArea;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, for display timestamps.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Status events emitted by the session and scheduler.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StatusEvent {
    /// Initial content loaded from storage (empty string if absent).
    Loaded {
        content: String,
        /// When the load completed, in milliseconds since Unix epoch.
        timestamp: u64,
    },
    /// Local content durably written to storage.
    Saved {
        timestamp: u64,
    },
    /// A remote change was accepted and replaced local content.
    RemoteApplied {
        content: String,
        timestamp: u64,
    },
    /// A backend operation failed; in-memory state is unchanged.
    StorageError {
        message: String,
        timestamp: u64,
    },
    /// Storage area chosen by the startup probe.
    AreaSelected {
        area: StorageArea,
        timestamp: u64,
    },
    /// Manual refresh began (host should disable the refresh control).
    RefreshStarted {
        timestamp: u64,
    },
    /// Manual refresh finished (control may be re-enabled).
    RefreshFinished {
        timestamp: u64,
    },
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving events,
/// drop it (or let it go out of scope) to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Event bus for publishing status events to subscribers.
///
/// Wrap in `Arc` to enable subscriptions.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Arc<dyn Fn(StatusEvent) + Send + Sync>)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    ///
    /// Requires `self` to be wrapped in `Arc`.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(StatusEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // Use try_write to avoid deadlock if Drop runs during panic unwinding
        // while a read lock is held (e.g., during emit).
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: StatusEvent) {
        // Clone the callback list to prevent deadlock if a callback calls subscribe.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }
}
