// ============================
// crates/backend-lib/src/auth.rs
// ============================
//! Channel authentication.
//!
//! Tokens are presented at handshake time as a query parameter, never in the
//! first message. Verification checks signature and expiry; a connection
//! whose token does not verify is closed before it reaches the open state.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rendezvous_common::RejectReason;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Claims carried in a channel token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Display name, cached so broadcasts need no user lookup on connect
    pub name: String,
    /// Expiry, seconds since epoch
    pub exp: i64,
}

/// Verifies handshake tokens against the shared secret.
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 0;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validate the token from the handshake query. `None` or an empty
    /// string is `TokenRequired`; anything that fails signature or expiry
    /// checks is `TokenInvalid`.
    pub fn verify(&self, token: Option<&str>) -> Result<Claims, RejectReason> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(RejectReason::TokenRequired)?;
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                debug!(%err, "token rejected");
                RejectReason::TokenInvalid
            })
    }
}

/// Issue a token for a user. The token service proper is an external
/// collaborator; this helper exists for the binary's dev mode and for tests.
pub fn issue_token(secret: &str, user_id: &str, name: &str, ttl: Duration) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        name: name.to_string(),
        exp: (Utc::now() + ttl).timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}
