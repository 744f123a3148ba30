use crate::domain_port::{KeyValueStore, StorageChange, StorageError, StorageWatcher};
use nanoid::nanoid;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

struct Shared {
    entries: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StorageChange>,
}

/// In-process store. Handles made with [`MemoryStore::handle`] share the same
/// entries and see each other's writes through [`KeyValueStore::watch`], the
/// way tabs of one browser profile share local storage.
pub struct MemoryStore {
    shared: Arc<Shared>,
    origin: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                changes,
            }),
            origin: nanoid!(10),
        }
    }

    /// Another view on the same entries with its own origin.
    pub fn handle(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            origin: nanoid!(10),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn publish(&self, key: &str) {
        // no subscribers is fine
        let _ = self.shared.changes.send(StorageChange {
            key: Some(key.to_string()),
            origin: self.origin.clone(),
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self
            .shared
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.shared
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self.publish(key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let removed = self
            .shared
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if removed.is_some() {
            self.publish(key);
        }
        Ok(())
    }

    fn watch(&self) -> Option<StorageWatcher> {
        Some(StorageWatcher::new(
            self.shared.changes.subscribe(),
            self.origin.clone(),
        ))
    }
}
