use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Read-only snapshot returned by the facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub is_valid: bool,
    pub time_until_expiry: Duration,
    pub is_refreshing: bool,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    RetriesExhausted,
    NoRefreshToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    TokenRefreshed {
        at: DateTime<Utc>,
    },
    SessionExpired {
        at: DateTime<Utc>,
        reason: ExpiryReason,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::TokenRefreshed { .. } => "token-refreshed",
            SessionEvent::SessionExpired { .. } => "session-expired",
        }
    }
}

/// Host environment notifications the monitor reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentSignal {
    /// The application came back to the foreground.
    Foregrounded,
    Online,
    Offline,
    /// Token keys were rewritten by another instance sharing the store.
    StorageChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);
