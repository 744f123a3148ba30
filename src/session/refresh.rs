use crate::domain_model::Token;
use crate::domain_port::{ExchangeError, StorageError, TokenExchanger};
use crate::session::TokenStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    NoRefreshToken,
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error("token exchange timed out after {0:?}")]
    Timeout(Duration),
    #[error("token storage failed: {0}")]
    Storage(#[from] StorageError),
    #[error("refresh cycle was cancelled")]
    Cancelled,
}

impl RefreshError {
    /// Failures that no amount of retrying can fix.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RefreshError::NoRefreshToken)
    }
}

/// One exchange of the stored refresh token for a new access token.
pub struct SilentRefresh {
    tokens: Arc<TokenStore>,
    exchanger: Arc<dyn TokenExchanger>,
}

impl SilentRefresh {
    pub fn new(tokens: Arc<TokenStore>, exchanger: Arc<dyn TokenExchanger>) -> Self {
        Self { tokens, exchanger }
    }

    /// On success the new pair is persisted; on failure the store is left as it was.
    /// A grant arriving after `cancel` fired is discarded.
    pub async fn attempt(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Token, RefreshError> {
        let refresh_token = self
            .tokens
            .refresh_token()?
            .ok_or(RefreshError::NoRefreshToken)?;

        let grant = tokio::time::timeout(timeout, self.exchanger.exchange(&refresh_token))
            .await
            .map_err(|_| RefreshError::Timeout(timeout))??;

        let stored = self.tokens.replace_unless_cancelled(
            cancel,
            &grant.access_token,
            grant.refresh_token.as_deref(),
        )?;
        if !stored {
            tracing::debug!("dropping token grant of a cancelled cycle");
            return Err(RefreshError::Cancelled);
        }
        Ok(Token::parse(grant.access_token))
    }
}
