use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: i64,
}

/// Reads the `exp` claim of a bearer token without verifying its signature.
///
/// Returns `None` for anything that is not a JWT carrying a numeric `exp`.
pub fn decode_expiry(value: &str) -> Option<DateTime<Utc>> {
    let mut v = Validation::new(Algorithm::HS256);
    v.insecure_disable_signature_validation();
    v.validate_exp = false;
    v.validate_aud = false;
    v.required_spec_claims.clear();
    let data = decode::<ExpiryClaims>(value, &DecodingKey::from_secret(&[]), &v).ok()?;
    DateTime::from_timestamp(data.claims.exp, 0)
}

/// An access token together with the expiry decoded from its payload.
///
/// A token whose expiry cannot be decoded is never valid.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Token {
    pub fn parse(value: impl Into<String>) -> Self {
        let value = value.into();
        let expires_at = decode_expiry(&value);
        Self { value, expires_at }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if exp > now)
    }

    /// Time left before expiry, saturating at zero.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        match self.expires_at {
            Some(exp) => (exp - now).to_std().unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Tokens handed over by the login endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of a successful refresh exchange. The refresh token is only present
/// when the issuer rotated it.
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("rotated", &self.refresh_token.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    fn jwt_with(claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"issuer-secret"),
        )
        .unwrap()
    }

    #[test]
    fn decodes_expiry_without_knowing_the_key() {
        let token = jwt_with(json!({ "sub": "42", "exp": 1_900_000_000 }));
        assert_eq!(
            decode_expiry(&token),
            DateTime::from_timestamp(1_900_000_000, 0)
        );
    }

    #[test]
    fn garbage_is_treated_as_expired() {
        let now = Utc::now();
        for raw in ["", "not-a-token", "a.b.c", "eyJhbGciOiJIUzI1NiJ9.e30.sig"] {
            let token = Token::parse(raw);
            assert_eq!(token.expires_at(), None, "{raw}");
            assert!(!token.is_valid_at(now));
            assert_eq!(token.remaining_at(now), Duration::ZERO);
        }
    }

    #[test]
    fn non_numeric_exp_is_rejected() {
        let token = Token::parse(jwt_with(json!({ "exp": "tomorrow" })));
        assert!(!token.is_valid_at(Utc::now()));
    }

    #[test]
    fn validity_is_strict() {
        let exp = DateTime::from_timestamp(1_900_000_000, 0).unwrap();
        let token = Token::parse(jwt_with(json!({ "exp": exp.timestamp() })));
        assert!(token.is_valid_at(exp - chrono::Duration::seconds(1)));
        assert!(!token.is_valid_at(exp));
        assert_eq!(token.remaining_at(exp + chrono::Duration::seconds(5)), Duration::ZERO);
        assert_eq!(
            token.remaining_at(exp - chrono::Duration::seconds(290)),
            Duration::from_secs(290)
        );
    }

    #[test]
    fn debug_output_hides_the_value() {
        let token = Token::parse("secret-value");
        assert!(!format!("{token:?}").contains("secret-value"));
    }
}
