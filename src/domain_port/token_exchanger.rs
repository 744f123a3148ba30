use crate::domain_model::TokenGrant;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("token endpoint answered {0}")]
    Status(u16),
    #[error("token endpoint response is malformed: {0}")]
    MalformedBody(String),
    #[error("token endpoint response carried no access token")]
    MissingAccessToken,
}

#[async_trait::async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Trade a refresh token for a new access token (and possibly a rotated refresh token).
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, ExchangeError>;
}
