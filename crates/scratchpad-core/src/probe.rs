//! Startup capability probe for the synchronized storage area.
//!
//! One trivial write+remove against the synced area decides which area
//! the whole session uses. Any failure permanently downgrades the session
//! to the device-local area; the choice is never re-evaluated mid-session.

use crate::storage::{PROBE_KEY, Result, StorageArea, StorageBackend};
use tracing::{debug, info};

/// Probe the synced area and pick the storage area for this session.
///
/// Probe failure is not an error, only a status label; callers surface it
/// via `StatusEvent::AreaSelected`.
pub async fn probe_area<S: StorageBackend>(storage: &S) -> StorageArea {
    match try_probe(storage).await {
        Ok(()) => {
            debug!("synced area probe succeeded");
            StorageArea::Synced
        }
        Err(e) => {
            info!(%e, "synced area unavailable, falling back to local area");
            StorageArea::Local
        }
    }
}

async fn try_probe<S: StorageBackend>(storage: &S) -> Result<()> {
    storage.set(StorageArea::Synced, PROBE_KEY, "probe").await?;
    storage.remove(StorageArea::Synced, PROBE_KEY).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_probe_selects_synced_when_available() {
        let storage = MemoryStorage::new();
        assert_eq!(probe_area(&storage).await, StorageArea::Synced);

        // The probe key is cleaned up
        let leftover = storage.get(StorageArea::Synced, PROBE_KEY).await.unwrap();
        assert_eq!(leftover, None);
    }

    #[tokio::test]
    async fn test_probe_failure_falls_back_to_local() {
        let storage = MemoryStorage::new();
        storage.fail_next_ops(1);
        assert_eq!(probe_area(&storage).await, StorageArea::Local);

        // Subsequent operations against the local area work normally
        storage
            .set(StorageArea::Local, "k", "v")
            .await
            .unwrap();
    }
}
