//! Storage backend abstraction for the scratchpad note.
//!
//! Implementations:
//! - `MemoryStorage` - For testing (supports failure injection)
//! - `FileStorage` (in scratchpad-runtime) - One file per key via tokio::fs
//!
//! The backend exposes two interchangeable areas (synchronized vs.
//! device-local) and push change notifications: every successful `set` or
//! `remove` is delivered to all subscribers, including the writer's own
//! session.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// The single key under which the whole note is persisted.
pub const CONTENT_KEY: &str = "scratchpadContent";

/// Transient key used by the startup capability probe.
pub const PROBE_KEY: &str = "__scratchpad_probe__";

/// One of the two interchangeable key-value areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageArea {
    /// Synchronized across devices.
    Synced,
    /// Confined to this device.
    Local,
}

impl StorageArea {
    /// Short label for logging and status display.
    pub fn label(&self) -> &'static str {
        match self {
            StorageArea::Synced => "synced",
            StorageArea::Local => "local",
        }
    }
}

/// Old and new values of a single changed key.
#[derive(Debug, Clone)]
pub struct KeyChange {
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Push notification describing a batch of key changes in one area.
#[derive(Debug, Clone)]
pub struct ChangeNotification {
    pub area: StorageArea,
    pub changes: HashMap<String, KeyChange>,
}

impl ChangeNotification {
    /// True when the notification touches `key` in `area`.
    pub fn concerns(&self, area: StorageArea, key: &str) -> bool {
        self.area == area && self.changes.contains_key(key)
    }
}

/// Key-value storage backend with two areas and push notifications.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read a key. Absent keys resolve to `None`.
    async fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>>;

    /// Write a key. Triggers a change notification observable by all
    /// subscribers, including the caller's own session.
    async fn set(&self, area: StorageArea, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Used transiently by the startup probe.
    async fn remove(&self, area: StorageArea, key: &str) -> Result<()>;

    /// Subscribe to change notifications for both areas.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeNotification>;
}

/// In-memory storage backend for testing.
pub struct MemoryStorage {
    synced: RwLock<HashMap<String, String>>,
    local: RwLock<HashMap<String, String>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChangeNotification>>>,
    /// Number of successful `set` calls (for write-count assertions).
    writes: AtomicUsize,
    /// When non-zero, the next N operations fail with `Unavailable`.
    fail_remaining: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            synced: RwLock::new(HashMap::new()),
            local: RwLock::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` operations fail, for exercising error paths.
    pub fn fail_next_ops(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::Relaxed);
    }

    /// Number of successful writes performed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Insert a value without notifying subscribers or counting a write,
    /// simulating a remote write whose change notification this client
    /// missed (the case the poll path exists for).
    pub fn set_silent(&self, area: StorageArea, key: &str, value: &str) {
        let mut map = self.map(area).write().unwrap_or_else(|e| e.into_inner());
        map.insert(key.to_string(), value.to_string());
    }

    fn map(&self, area: StorageArea) -> &RwLock<HashMap<String, String>> {
        match area {
            StorageArea::Synced => &self.synced,
            StorageArea::Local => &self.local,
        }
    }

    fn check_failure(&self) -> Result<()> {
        let remaining = self.fail_remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::Relaxed);
            return Err(StorageError::Unavailable("injected failure".into()));
        }
        Ok(())
    }

    fn notify(&self, area: StorageArea, key: &str, old: Option<String>, new: Option<String>) {
        let mut changes = HashMap::new();
        changes.insert(
            key.to_string(),
            KeyChange {
                old_value: old,
                new_value: new,
            },
        );
        let notification = ChangeNotification { area, changes };

        // Drop subscribers whose receiver has gone away.
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>> {
        self.check_failure()?;
        let map = self.map(area).read().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(key).cloned())
    }

    async fn set(&self, area: StorageArea, key: &str, value: &str) -> Result<()> {
        self.check_failure()?;
        let old = {
            let mut map = self.map(area).write().unwrap_or_else(|e| e.into_inner());
            map.insert(key.to_string(), value.to_string())
        };
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.notify(area, key, old, Some(value.to_string()));
        Ok(())
    }

    async fn remove(&self, area: StorageArea, key: &str) -> Result<()> {
        self.check_failure()?;
        let old = {
            let mut map = self.map(area).write().unwrap_or_else(|e| e.into_inner());
            map.remove(key)
        };
        if old.is_some() {
            self.notify(area, key, old, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeNotification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }
}

// Implement StorageBackend for Arc<T> where T: StorageBackend
// This allows sharing one backend between multiple sessions in tests
#[async_trait]
impl<T: StorageBackend + Send + Sync> StorageBackend for std::sync::Arc<T> {
    async fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>> {
        (**self).get(area, key).await
    }

    async fn set(&self, area: StorageArea, key: &str, value: &str) -> Result<()> {
        (**self).set(area, key, value).await
    }

    async fn remove(&self, area: StorageArea, key: &str) -> Result<()> {
        (**self).remove(area, key).await
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeNotification> {
        (**self).subscribe()
    }
}
