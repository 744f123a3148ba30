use crate::domain_model::Token;
use crate::domain_port::{Clock, KeyValueStore, StorageError, StorageWatcher};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

pub fn is_token_key(key: &str) -> bool {
    key == ACCESS_TOKEN_KEY || key == REFRESH_TOKEN_KEY
}

/// Owner of the persisted access/refresh token pair.
pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    writes: Mutex<()>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            writes: Mutex::new(()),
        }
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn access_token(&self) -> Result<Option<Token>, StorageError> {
        Ok(self
            .storage
            .get(ACCESS_TOKEN_KEY)?
            .filter(|v| !v.is_empty())
            .map(Token::parse))
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .storage
            .get(REFRESH_TOKEN_KEY)?
            .filter(|v| !v.is_empty()))
    }

    pub fn is_valid(&self) -> Result<bool, StorageError> {
        let now = self.now();
        Ok(self
            .access_token()?
            .is_some_and(|token| token.is_valid_at(now)))
    }

    pub fn time_until_expiry(&self) -> Result<Duration, StorageError> {
        let now = self.now();
        Ok(self
            .access_token()?
            .map(|token| token.remaining_at(now))
            .unwrap_or(Duration::ZERO))
    }

    /// Stores a new access token, and the refresh token when one is given.
    /// The refresh token goes first so watchers of the access key see a complete pair.
    pub fn replace(&self, access: &str, refresh: Option<&str>) -> Result<(), StorageError> {
        let _guard = self.write_guard();
        self.write_pair(access, refresh)
    }

    /// Same as [`TokenStore::replace`] unless `cancel` has fired, in which case
    /// nothing is written. Returns whether the pair was stored.
    pub fn replace_unless_cancelled(
        &self,
        cancel: &CancellationToken,
        access: &str,
        refresh: Option<&str>,
    ) -> Result<bool, StorageError> {
        let _guard = self.write_guard();
        if cancel.is_cancelled() {
            return Ok(false);
        }
        self.write_pair(access, refresh)?;
        Ok(true)
    }

    fn write_pair(&self, access: &str, refresh: Option<&str>) -> Result<(), StorageError> {
        if let Some(refresh) = refresh {
            self.storage.set(REFRESH_TOKEN_KEY, refresh)?;
        }
        self.storage.set(ACCESS_TOKEN_KEY, access)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.write_guard();
        self.storage.remove(ACCESS_TOKEN_KEY)?;
        self.storage.remove(REFRESH_TOKEN_KEY)
    }

    pub fn watch(&self) -> Option<StorageWatcher> {
        self.storage.watch()
    }
}
