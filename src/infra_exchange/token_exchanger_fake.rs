use crate::domain_model::TokenGrant;
use crate::domain_port::{Clock, ExchangeError, TokenExchanger};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct FakeClaims {
    sub: String,
    exp: i64,
    iat: i64,
    jti: String,
}

const FAKE_SIGNING_KEY: &[u8] = b"campus-session-fake";

/// Builds an HS256 access token expiring at `expires_at`.
pub fn fake_access_token(issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> String {
    let claims = FakeClaims {
        sub: "fake-user".to_string(),
        exp: expires_at.timestamp(),
        iat: issued_at.timestamp(),
        jti: nanoid::nanoid!(8),
    };
    // HS256 over serializable claims cannot fail
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(FAKE_SIGNING_KEY),
    )
    .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Grant,
    Fail(ExchangeError),
    /// Never answers.
    Hang,
}

/// Scripted exchanger for tests and demos. Outcomes queued with
/// [`FakeTokenExchanger::then`] are used first, then the fallback applies.
pub struct FakeTokenExchanger {
    clock: Arc<dyn Clock>,
    script: Mutex<VecDeque<FakeOutcome>>,
    fallback: FakeOutcome,
    latency: Duration,
    lifetime: chrono::Duration,
    rotate: bool,
    calls: AtomicUsize,
}

impl FakeTokenExchanger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            script: Mutex::new(VecDeque::new()),
            fallback: FakeOutcome::Grant,
            latency: Duration::ZERO,
            lifetime: chrono::Duration::seconds(3600),
            rotate: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(clock: Arc<dyn Clock>, error: ExchangeError) -> Self {
        Self {
            fallback: FakeOutcome::Fail(error),
            ..Self::new(clock)
        }
    }

    pub fn then(self, outcome: FakeOutcome) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn without_rotation(mut self) -> Self {
        self.rotate = false;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> FakeOutcome {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait::async_trait]
impl TokenExchanger for FakeTokenExchanger {
    async fn exchange(&self, refresh_token: &str) -> Result<TokenGrant, ExchangeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let outcome = self.next_outcome();
        tracing::debug!(call, ?outcome, "fake token exchange");

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match outcome {
            FakeOutcome::Grant => {
                let now = self.clock.now();
                Ok(TokenGrant {
                    access_token: fake_access_token(now, now + self.lifetime),
                    refresh_token: self
                        .rotate
                        .then(|| format!("{refresh_token}.r{call}")),
                })
            }
            FakeOutcome::Fail(e) => Err(e),
            FakeOutcome::Hang => std::future::pending().await,
        }
    }
}
