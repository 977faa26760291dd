//! Storage media for the persisted session
//!
//! Mirrors the browser's key/value storage: string keys, string values,
//! and a change signal delivered to every other view sharing the same area.
//! - `MemoryStorage`: an in-process area shared by any number of views
//! - `FileStorage`: a JSON file, so the session survives a restart

use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Identifies one view (tab, window, process handle) onto a storage area
pub type ViewId = u64;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// A mutation of one storage key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    /// `None` when the key was removed
    pub new_value: Option<String>,
    /// View that performed the write
    pub origin: ViewId,
}

/// Key/value medium backing the session store
pub trait StorageBackend: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn remove_item(&self, key: &str) -> Result<()>;

    /// Identity of this view. Changes whose `origin` equals it were made here.
    fn view_id(&self) -> ViewId;

    /// Subscribe to changes made through any view of the same area
    fn watch(&self) -> broadcast::Receiver<StorageChange>;
}

// ============================================================================
// In-memory storage
// ============================================================================

struct StorageArea {
    items: RwLock<HashMap<String, String>>,
    changes: broadcast::Sender<StorageChange>,
    next_view: AtomicU64,
}

/// One view onto a shared in-memory storage area
#[derive(Clone)]
pub struct MemoryStorage {
    area: Arc<StorageArea>,
    view: ViewId,
}

impl MemoryStorage {
    /// Create a fresh area and return its first view
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let area = Arc::new(StorageArea {
            items: RwLock::new(HashMap::new()),
            changes,
            next_view: AtomicU64::new(1),
        });
        let view = area.next_view.fetch_add(1, Ordering::Relaxed);
        Self { area, view }
    }

    /// Open another view onto the same area (another tab of the same profile)
    pub fn open_view(&self) -> Self {
        let view = self.area.next_view.fetch_add(1, Ordering::Relaxed);
        debug!(view, "Opened storage view");
        Self {
            area: self.area.clone(),
            view,
        }
    }

    fn publish(&self, key: &str, new_value: Option<String>) {
        // No receivers is fine: nobody is watching yet
        let _ = self.area.changes.send(StorageChange {
            key: key.to_string(),
            new_value,
            origin: self.view,
        });
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("view", &self.view)
            .field("keys", &self.area.items.read().len())
            .finish()
    }
}

impl StorageBackend for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.area.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.area
            .items
            .write()
            .insert(key.to_string(), value.to_string());
        self.publish(key, Some(value.to_string()));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let removed = self.area.items.write().remove(key);
        if removed.is_some() {
            self.publish(key, None);
        }
        Ok(())
    }

    fn view_id(&self) -> ViewId {
        self.view
    }

    fn watch(&self) -> broadcast::Receiver<StorageChange> {
        self.area.changes.subscribe()
    }
}

// ============================================================================
// File-backed storage
// ============================================================================

/// Storage persisted as a JSON object in a single file.
///
/// The whole map is rewritten on every mutation and the in-memory copy only
/// changes once the write succeeded. A missing file starts empty; an
/// unreadable or corrupt file is logged and also starts empty.
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
    changes: broadcast::Sender<StorageChange>,
}

impl FileStorage {
    const VIEW: ViewId = 1;

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let items = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(items) => items,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Session file is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            path,
            items: Mutex::new(items),
            changes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(items)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| Error::Storage(format!("cannot write {}: {}", self.path.display(), e)))
    }

    fn publish(&self, key: &str, new_value: Option<String>) {
        let _ = self.changes.send(StorageChange {
            key: key.to_string(),
            new_value,
            origin: Self::VIEW,
        });
    }
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage").field("path", &self.path).finish()
    }
}

impl StorageBackend for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        {
            let mut items = self.items.lock();
            let mut next = items.clone();
            next.insert(key.to_string(), value.to_string());
            self.persist(&next)?;
            *items = next;
        }
        self.publish(key, Some(value.to_string()));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        {
            let mut items = self.items.lock();
            if !items.contains_key(key) {
                return Ok(());
            }
            let mut next = items.clone();
            next.remove(key);
            self.persist(&next)?;
            *items = next;
        }
        self.publish(key, None);
        Ok(())
    }

    fn view_id(&self) -> ViewId {
        Self::VIEW
    }

    fn watch(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_views_share_items() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.open_view();

        tab_a.set_item("token", "abc").unwrap();
        assert_eq!(tab_b.get_item("token").unwrap().as_deref(), Some("abc"));

        tab_b.remove_item("token").unwrap();
        assert!(tab_a.get_item("token").unwrap().is_none());
        assert_ne!(tab_a.view_id(), tab_b.view_id());
    }

    #[test]
    fn test_changes_carry_origin() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.open_view();
        let mut rx = tab_b.watch();

        tab_a.set_item("token", "abc").unwrap();
        tab_a.remove_item("token").unwrap();
        // Removing an absent key is silent
        tab_a.remove_item("token").unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.key, "token");
        assert_eq!(first.new_value.as_deref(), Some("abc"));
        assert_eq!(first.origin, tab_a.view_id());

        let second = rx.try_recv().unwrap();
        assert!(second.new_value.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("store.json");

        {
            let storage = FileStorage::open(&path).unwrap();
            storage.set_item("token", "abc").unwrap();
            storage.set_item("user", r#"{"role":"hr"}"#).unwrap();
            storage.remove_item("user").unwrap();
        }

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get_item("token").unwrap().as_deref(), Some("abc"));
        assert!(reopened.get_item("user").unwrap().is_none());
    }

    #[test]
    fn test_file_storage_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();

        let storage = FileStorage::open(&path).unwrap();
        assert!(storage.get_item("token").unwrap().is_none());

        storage.set_item("token", "fresh").unwrap();
        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get_item("token").unwrap().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_file_storage_failed_write_keeps_previous_items() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let storage = FileStorage::open(&path).unwrap();
        storage.set_item("token", "old").unwrap();
        let mut rx = storage.watch();

        // The temp file cannot be created while a directory holds its name
        std::fs::create_dir(path.with_extension("tmp")).unwrap();

        assert!(matches!(storage.set_item("token", "new"), Err(Error::Storage(_))));
        assert!(storage.remove_item("token").is_err());
        assert_eq!(storage.get_item("token").unwrap().as_deref(), Some("old"));
        assert!(rx.try_recv().is_err());

        std::fs::remove_dir(path.with_extension("tmp")).unwrap();
        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get_item("token").unwrap().as_deref(), Some("old"));
    }
}
