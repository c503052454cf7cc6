//! Document session: the single mutable state tuple (content, last-saved
//! snapshot, dirty flag) and the operations that arbitrate between local
//! edits and remote changes.
//!
//! The arbitration rule compares three quantities — `stored` (backend),
//! `current` (live content), `last_saved` (last confirmed write):
//!
//! 1. stored == current: already consistent, no action.
//! 2. stored == last_saved: divergence is an unsaved local edit; never
//!    overwrite it with the stale stored value.
//! 3. otherwise a genuine remote change exists: apply it only when the
//!    dirty flag is clear, else defer to a later cycle.
//!
//! This is last-writer-wins with a local-edit-priority bias. It assumes a
//! single actively-typing client at a time; simultaneous edits on two
//! devices are not merged and one eventually overwrites the other.

use crate::events::{EventBus, StatusEvent, now_millis};
use crate::storage::{
    CONTENT_KEY, ChangeNotification, Result, StorageArea, StorageBackend, StorageError,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Stored value matches live content; nothing to do.
    InSync,
    /// Stored value matches the last save; the only divergence is an
    /// unsaved local edit that hasn't reached storage yet.
    LocalPending,
    /// A remote change exists but the user has unsaved edits; retry on a
    /// later cycle.
    Deferred,
    /// The remote value replaced local state.
    Applied,
}

/// One open scratchpad view, generic over the storage backend.
pub struct Session<S: StorageBackend> {
    storage: S,
    area: StorageArea,
    events: Arc<EventBus>,
    content: String,
    last_saved: String,
    dirty: bool,
    last_update_millis: Option<u64>,
}

impl<S: StorageBackend> Session<S> {
    pub fn new(storage: S, area: StorageArea, events: Arc<EventBus>) -> Self {
        Self {
            storage,
            area,
            events,
            content: String::new(),
            last_saved: String::new(),
            dirty: false,
            last_update_millis: None,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn last_saved(&self) -> &str {
        &self.last_saved
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn area(&self) -> StorageArea {
        self.area
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Timestamp of the last successful save or accepted remote update.
    pub fn last_update_millis(&self) -> Option<u64> {
        self.last_update_millis
    }

    /// Record a local edit: replace the content wholesale and mark dirty.
    ///
    /// The caller owns debounce scheduling; this method has no side
    /// effects beyond the state tuple.
    pub fn on_edit(&mut self, content: String) {
        self.content = content;
        self.dirty = true;
    }

    /// True when an auto-save tick or teardown flush should write.
    pub fn needs_save(&self) -> bool {
        self.dirty && self.content != self.last_saved
    }

    /// Read the note from storage and reset the state tuple to it.
    ///
    /// An absent key loads as the empty string. On backend failure the
    /// prior in-memory state is left untouched and a `StorageError`
    /// status is surfaced.
    pub async fn load(&mut self) -> Result<()> {
        let value = match self.storage.get(self.area, CONTENT_KEY).await {
            Ok(value) => value,
            Err(e) => return Err(self.report_storage_error("load", e)),
        };

        let content = value.unwrap_or_default();
        debug!(area = self.area.label(), len = content.len(), "loaded note");
        self.content = content.clone();
        self.last_saved = content.clone();
        self.dirty = false;
        self.events.emit(StatusEvent::Loaded {
            content,
            timestamp: now_millis(),
        });
        Ok(())
    }

    /// Write the current content to storage if it differs from the last
    /// confirmed save.
    ///
    /// Returns `Ok(true)` if a write happened, `Ok(false)` on the
    /// equality short-circuit. Idempotent: two consecutive calls with no
    /// intervening edit perform exactly one write. On failure every field
    /// of the state tuple is left untouched; the next debounce, auto-save
    /// tick, or poll re-attempts the same write.
    pub async fn save(&mut self) -> Result<bool> {
        if self.content == self.last_saved {
            // Coincidental equality counts as clean.
            self.dirty = false;
            return Ok(false);
        }

        if let Err(e) = self.storage.set(self.area, CONTENT_KEY, &self.content).await {
            return Err(self.report_storage_error("save", e));
        }

        self.last_saved = self.content.clone();
        self.dirty = false;
        let timestamp = now_millis();
        self.last_update_millis = Some(timestamp);
        debug!(area = self.area.label(), len = self.content.len(), "saved note");
        self.events.emit(StatusEvent::Saved { timestamp });
        Ok(true)
    }

    /// Read the stored value and arbitrate against local state.
    ///
    /// Shared by the poll timer, the push-notification handler, and
    /// manual refresh.
    pub async fn check_remote(&mut self) -> Result<SyncOutcome> {
        let stored = match self.storage.get(self.area, CONTENT_KEY).await {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => return Err(self.report_storage_error("sync check", e)),
        };

        if stored == self.content {
            return Ok(SyncOutcome::InSync);
        }

        if stored == self.last_saved {
            debug!("stored value is stale; local edit not yet saved");
            return Ok(SyncOutcome::LocalPending);
        }

        if self.dirty {
            debug!("remote change deferred: local edit in flight");
            return Ok(SyncOutcome::Deferred);
        }

        // Genuine remote change and the user is not mid-edit: accept it
        // as one unit.
        debug!(len = stored.len(), "applying remote change");
        self.content = stored.clone();
        self.last_saved = stored.clone();
        self.dirty = false;
        let timestamp = now_millis();
        self.last_update_millis = Some(timestamp);
        self.events.emit(StatusEvent::RemoteApplied {
            content: stored,
            timestamp,
        });
        Ok(SyncOutcome::Applied)
    }

    /// Push path: react to a storage change notification.
    ///
    /// Notifications for other keys or the inactive area are ignored.
    /// Relevant ones run the same read-then-arbitrate as the poll path;
    /// the payload is used only for filtering.
    pub async fn handle_notification(
        &mut self,
        notification: &ChangeNotification,
    ) -> Result<Option<SyncOutcome>> {
        if !notification.concerns(self.area, CONTENT_KEY) {
            return Ok(None);
        }
        self.check_remote().await.map(Some)
    }

    fn report_storage_error(&self, context: &str, error: StorageError) -> StorageError {
        warn!(context, %error, "storage operation failed");
        self.events.emit(StatusEvent::StorageError {
            message: error.to_string(),
            timestamp: now_millis(),
        });
        error
    }
}
