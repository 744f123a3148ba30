use crate::domain_model::{ConfigError, ListenerId, SessionConfig, SessionConfigPatch, SessionStatus, TokenPair};
use crate::domain_port::StorageError;
use crate::session::{SessionListener, SignalSender};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("invalid session config: {0}")]
    Config(#[from] ConfigError),
    #[error("session manager has been destroyed")]
    Destroyed,
}

#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    /// Spawns the background monitor. Calling it again while running is a no-op.
    fn start(&self) -> Result<(), SessionError>;
    fn login(&self, tokens: TokenPair) -> Result<(), SessionError>;
    fn logout(&self) -> Result<(), SessionError>;
    fn session_status(&self) -> Result<SessionStatus, SessionError>;
    /// The stored access token, only while it is valid.
    fn access_token(&self) -> Result<Option<String>, SessionError>;
    /// Refreshes regardless of the threshold, joining a cycle already in flight.
    async fn force_refresh(&self) -> bool;
    /// Reports a 401 from the backend; the rejection always wins over the decoded expiry.
    async fn on_unauthorized(&self) -> bool;
    fn config(&self) -> SessionConfig;
    fn update_config(&self, patch: SessionConfigPatch) -> Result<SessionConfig, SessionError>;
    fn subscribe(&self, listener: SessionListener) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId) -> bool;
    fn signals(&self) -> SignalSender;
    /// Stops the monitor and drops every listener. Safe to call more than once.
    async fn destroy(&self);
}
