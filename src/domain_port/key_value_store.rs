use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage format error: {0}")]
    Format(String),
}

/// A write observed on a shared store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// Changed key; `None` when changes were dropped and any key may differ.
    pub key: Option<String>,
    pub origin: String,
}

/// Durable string key/value storage holding the session tokens.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Feed of writes made by *other* handles of the same store, if the backend has one.
    fn watch(&self) -> Option<StorageWatcher> {
        None
    }
}

pub struct StorageWatcher {
    rx: broadcast::Receiver<StorageChange>,
    origin: String,
}

impl StorageWatcher {
    pub fn new(rx: broadcast::Receiver<StorageChange>, origin: impl Into<String>) -> Self {
        Self {
            rx,
            origin: origin.into(),
        }
    }

    /// Waits for the next foreign change. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<StorageChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.origin == self.origin => continue,
                Ok(change) => return Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "storage watcher lagged");
                    return Some(StorageChange {
                        key: None,
                        origin: String::new(),
                    });
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
