//! scratchpad-runtime: Native driver for the scratchpad core.
//!
//! Provides the tokio-based scheduler (debounce, auto-save, sync poll,
//! teardown flush) and a file-backed storage backend. Embedded by a host
//! through `Scratchpad::open` and `ScratchpadHandle`; there is no CLI
//! surface.

pub mod config;
pub mod file_store;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use file_store::FileStorage;
pub use scheduler::{Scratchpad, ScratchpadHandle};
