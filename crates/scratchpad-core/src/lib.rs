//! scratchpad-core: Platform-independent core for a single synchronized note.
//!
//! This crate provides:
//! - The document session (edit tracking, idempotent save/load, the
//!   remote-change arbitration rule)
//! - The `StorageBackend` trait with two areas and push notifications
//! - The startup probe that picks the storage area once per session
//! - The status event bus consumed by a host display layer

pub mod events;
pub mod probe;
pub mod session;
pub mod storage;

pub use events::{EventBus, StatusEvent, Subscription, now_millis};
pub use probe::probe_area;
pub use session::{Session, SyncOutcome};
pub use storage::{
    CONTENT_KEY, ChangeNotification, KeyChange, MemoryStorage, StorageArea, StorageBackend,
    StorageError,
};
