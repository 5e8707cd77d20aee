//! Session context - the cached bearer token
//!
//! Set on login, cleared on logout or expiry, read by the API client on every
//! request. Token claims are decoded without signature verification; the
//! backend is the authority, the client only needs `exp`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::info;

/// JWT claims the dashboard looks at
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Claims {
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Decode the payload segment of a JWT
pub fn decode_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    // Some issuers keep the padding
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[derive(Debug, Default)]
pub struct SessionContext {
    token: RwLock<Option<String>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: RwLock::new(Some(token.into())) }
    }

    /// Login
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Logout or expiry
    pub fn clear(&self) {
        *self.token.write() = None;
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn claims(&self) -> Option<Claims> {
        self.token.read().as_deref().and_then(decode_claims)
    }

    /// True when there is no usable token at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.claims().and_then(|c| c.exp) {
            Some(exp) => now.timestamp() >= exp,
            None => true,
        }
    }

    /// Token if still valid; an expired token is cleared
    pub fn current_token(&self, now: DateTime<Utc>) -> Option<String> {
        if self.token.read().is_none() {
            return None;
        }
        if self.is_expired(now) {
            info!("session_token_expired");
            self.clear();
            return None;
        }
        self.token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn token_with(payload: &str) -> String {
        format!("eyJhbGciOiJIUzI1NiJ9.{}.sig", URL_SAFE_NO_PAD.encode(payload))
    }

    #[test]
    fn test_decode_claims() {
        let token = token_with(r#"{"exp": 1700000000, "sub": "operator", "role": "Admin"}"#);
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.exp, Some(1_700_000_000));
        assert_eq!(claims.role.as_deref(), Some("Admin"));
        assert_eq!(decode_claims("not-a-jwt"), None);
    }

    #[test]
    fn test_expiry() {
        let session = SessionContext::with_token(token_with(r#"{"exp": 1700000000}"#));
        let before = Utc.timestamp_opt(1_699_999_999, 0).unwrap();
        let after = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        assert!(!session.is_expired(before));
        assert!(session.current_token(before).is_some());

        assert!(session.is_expired(after));
        assert_eq!(session.current_token(after), None);
        // Expired token was cleared
        assert_eq!(session.token(), None);
    }

    #[test]
    fn test_token_without_exp_is_expired() {
        let session = SessionContext::with_token(token_with(r#"{"sub": "x"}"#));
        assert!(session.is_expired(Utc::now()));
    }

    #[test]
    fn test_set_and_clear() {
        let session = SessionContext::new();
        assert_eq!(session.token(), None);
        session.set_token("abc");
        assert_eq!(session.token().as_deref(), Some("abc"));
        session.clear();
        assert_eq!(session.token(), None);
    }
}
