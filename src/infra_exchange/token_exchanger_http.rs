use crate::domain_model::TokenGrant;
use crate::domain_port::{ExchangeError, TokenExchanger};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: Option<String>,
    refresh: Option<String>,
}

/// Token exchange against a `POST {"refresh": ...}` endpoint answering
/// `{"access": ..., "refresh": ...}`, `refresh` being present only on rotation.
#[derive(Clone)]
pub struct HttpTokenExchanger {
    http_client: reqwest::Client,
    token_url: String,
}

impl HttpTokenExchanger {
    pub fn new(token_url: impl Into<String>, request_timeout: Duration) -> Result<Self, ExchangeError> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        Ok(Self {
            http_client,
            token_url: token_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, ExchangeError> {
        tracing::debug!(url = %self.token_url, "exchanging refresh token");

        let response = self
            .http_client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // the body may echo credentials, keep only its size
            let body_len = response.text().await.map(|b| b.len()).unwrap_or_default();
            tracing::warn!(status = %status, body_len, "token endpoint rejected refresh");
            return Err(ExchangeError::Status(status.as_u16()));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ExchangeError::MalformedBody(e.to_string()))?;

        match body.access {
            Some(access_token) if !access_token.is_empty() => Ok(TokenGrant {
                access_token,
                refresh_token: body.refresh.filter(|r| !r.is_empty()),
            }),
            _ => Err(ExchangeError::MissingAccessToken),
        }
    }
}
