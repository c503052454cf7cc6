//! File-backed storage implementation using tokio::fs.
//!
//! Each key is stored as one file under `<base>/<area>/<key>`. Change
//! notifications are delivered to in-process subscribers on every
//! successful write or remove; external edits to the files are only
//! observed through the poll path.

use async_trait::async_trait;
use scratchpad_core::storage::{
    ChangeNotification, KeyChange, Result, StorageArea, StorageBackend, StorageError,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::fs;
use tokio::sync::mpsc;

/// File-per-key storage backend rooted at a base directory.
pub struct FileStorage {
    base_path: PathBuf,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChangeNotification>>>,
}

impl FileStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn key_path(&self, area: StorageArea, key: &str) -> PathBuf {
        self.base_path.join(area.label()).join(key)
    }

    fn notify(&self, area: StorageArea, key: &str, old: Option<String>, new: Option<String>) {
        let notification = ChangeNotification {
            area,
            changes: HashMap::from([(
                key.to_string(),
                KeyChange {
                    old_value: old,
                    new_value: new,
                },
            )]),
        };

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
    }

    async fn read_if_present(&self, area: StorageArea, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.key_path(area, key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e.to_string())),
        }
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn get(&self, area: StorageArea, key: &str) -> Result<Option<String>> {
        self.read_if_present(area, key).await
    }

    async fn set(&self, area: StorageArea, key: &str, value: &str) -> Result<()> {
        let path = self.key_path(area, key);

        // Create the area directory if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }

        let old = self.read_if_present(area, key).await?;
        fs::write(&path, value)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;

        self.notify(area, key, old, Some(value.to_string()));
        Ok(())
    }

    async fn remove(&self, area: StorageArea, key: &str) -> Result<()> {
        let path = self.key_path(area, key);
        let old = self.read_if_present(area, key).await?;
        if old.is_none() {
            return Ok(());
        }

        fs::remove_file(&path)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;

        self.notify(area, key, old, None);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());

        assert_eq!(storage.get(StorageArea::Synced, "note").await.unwrap(), None);

        storage
            .set(StorageArea::Synced, "note", "hello")
            .await
            .unwrap();
        assert_eq!(
            storage
                .get(StorageArea::Synced, "note")
                .await
                .unwrap()
                .as_deref(),
            Some("hello")
        );

        // Areas map to separate directories
        assert_eq!(storage.get(StorageArea::Local, "note").await.unwrap(), None);

        storage.remove(StorageArea::Synced, "note").await.unwrap();
        assert_eq!(storage.get(StorageArea::Synced, "note").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_value_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let storage = FileStorage::new(dir.path().to_path_buf());
        storage
            .set(StorageArea::Local, "note", "survives")
            .await
            .unwrap();
        drop(storage);

        let reopened = FileStorage::new(dir.path().to_path_buf());
        assert_eq!(
            reopened
                .get(StorageArea::Local, "note")
                .await
                .unwrap()
                .as_deref(),
            Some("survives")
        );
    }

    #[tokio::test]
    async fn test_set_and_remove_notify_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        let mut rx = storage.subscribe();

        storage.set(StorageArea::Synced, "note", "v1").await.unwrap();
        let notification = rx.try_recv().unwrap();
        assert!(notification.concerns(StorageArea::Synced, "note"));
        assert_eq!(notification.changes["note"].old_value, None);

        storage.set(StorageArea::Synced, "note", "v2").await.unwrap();
        let notification = rx.try_recv().unwrap();
        assert_eq!(
            notification.changes["note"].old_value.as_deref(),
            Some("v1")
        );

        storage.remove(StorageArea::Synced, "note").await.unwrap();
        let notification = rx.try_recv().unwrap();
        assert_eq!(notification.changes["note"].new_value, None);

        // Removing an absent key is silent
        storage.remove(StorageArea::Synced, "note").await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
