use crate::domain_port::{KeyValueStore, StorageChange, StorageError, StorageWatcher};
use nanoid::nanoid;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DISK_ORIGIN: &str = "disk";

type Entries = BTreeMap<String, String>;

struct Inner {
    path: PathBuf,
    /// Last contents this process wrote or observed. Held while touching the file.
    known: Mutex<Entries>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.known.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_all(&self) -> Result<Entries, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| StorageError::Format(e.to_string()))
    }

    fn write_all(&self, entries: &Entries) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let body =
            serde_json::to_vec_pretty(entries).map_err(|e| StorageError::Format(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Keys whose value on disk differs from what this process last saw.
    fn foreign_changes(&self) -> Result<Vec<String>, StorageError> {
        let mut known = self.lock();
        let current = self.read_all()?;
        let changed = current
            .iter()
            .filter(|(key, value)| known.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .chain(
                known
                    .keys()
                    .filter(|key| !current.contains_key(*key))
                    .cloned(),
            )
            .collect();
        *known = current;
        Ok(changed)
    }
}

/// Keeps entries in a single JSON object on disk so a session survives restarts.
///
/// Every write replaces the whole file through a sibling temp file and a rename.
/// Other processes sharing the file are noticed by polling it, see [`FileStore::watch`].
pub struct FileStore {
    inner: Arc<Inner>,
    origin: String,
    poll_interval: Duration,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                known: Mutex::new(BTreeMap::new()),
            }),
            origin: nanoid!(10),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn update(&self, apply: impl FnOnce(&mut Entries) -> bool) -> Result<(), StorageError> {
        let mut known = self.inner.lock();
        let mut entries = self.inner.read_all()?;
        if apply(&mut entries) {
            self.inner.write_all(&entries)?;
        }
        *known = entries;
        Ok(())
    }
}

async fn poll_file(inner: Weak<Inner>, changes: broadcast::Sender<StorageChange>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if changes.receiver_count() == 0 {
            break;
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match inner.foreign_changes() {
            Ok(keys) => {
                for key in keys {
                    let _ = changes.send(StorageChange {
                        key: Some(key),
                        origin: DISK_ORIGIN.to_string(),
                    });
                }
            }
            Err(e) => tracing::debug!(path = ?inner.path, "polling token file failed: {e}"),
        }
    }
    tracing::debug!("token file poller stopped");
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.inner.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| entries.remove(key).is_some())
    }

    /// Polls the file and reports keys rewritten by other processes. Writes made
    /// through this store are not reported. Needs a tokio runtime.
    fn watch(&self) -> Option<StorageWatcher> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime, token file is not watched");
            return None;
        };
        {
            let mut known = self.inner.lock();
            match self.inner.read_all() {
                Ok(current) => *known = current,
                Err(e) => tracing::debug!(path = ?self.inner.path, "token file unreadable: {e}"),
            }
        }
        let (changes, rx) = broadcast::channel(16);
        runtime.spawn(poll_file(
            Arc::downgrade(&self.inner),
            changes,
            self.poll_interval,
        ));
        Some(StorageWatcher::new(rx, self.origin.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn entries_survive_a_new_instance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session").join("tokens.json");

        let store = FileStore::new(&path);
        assert_eq!(store.get("access_token").unwrap(), None);
        store.set("access_token", "a").unwrap();
        store.set("refresh_token", "r").unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("access_token").unwrap().as_deref(), Some("a"));
        reopened.remove("access_token").unwrap();
        assert_eq!(store.get("access_token").unwrap(), None);
        assert_eq!(store.get("refresh_token").unwrap().as_deref(), Some("r"));
    }

    #[test]
    fn corrupt_file_is_a_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, "{not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.get("x"), Err(StorageError::Format(_))));
    }

    #[test]
    fn no_watch_outside_a_runtime() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("tokens.json"));
        assert!(store.watch().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_reports_writes_from_other_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        let mine = FileStore::new(&path).with_poll_interval(Duration::from_millis(50));
        let theirs = FileStore::new(&path);
        let mut watcher = mine.watch().unwrap();

        mine.set("refresh_token", "mine").unwrap();
        theirs.set("access_token", "theirs").unwrap();

        let change = tokio::time::timeout(Duration::from_secs(1), watcher.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.key.as_deref(), Some("access_token"));

        theirs.remove("refresh_token").unwrap();
        let change = tokio::time::timeout(Duration::from_secs(1), watcher.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.key.as_deref(), Some("refresh_token"));
    }

    #[tokio::test(start_paused = true)]
    async fn poller_stops_with_the_watcher() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        let mine = FileStore::new(&path).with_poll_interval(Duration::from_millis(50));
        drop(mine.watch().unwrap());

        // only the poller would still hold a weak reference
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(Arc::weak_count(&mine.inner), 0);
    }
}
