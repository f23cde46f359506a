//! Stateless bearer tokens: HS256 JWTs carrying `{id, username, email}`.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default token lifetime: 1 day (seconds).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 3600;

/// Identity decoded from a verified token and attached to protected requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub email: String,
}

/// Signed token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    id: String,
    username: String,
    email: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),

    #[error("token verification failed: {0}")]
    Verify(#[source] jsonwebtoken::errors::Error),
}

/// Signs and verifies tokens with a server-held secret.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Sign a token for `user`, expiring `ttl_secs` from now.
    pub fn issue(&self, user: &AuthUser) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        self.sign(user, now, now.saturating_add(ttl))
    }

    fn sign(&self, user: &AuthUser, iat: i64, exp: i64) -> Result<String, TokenError> {
        let claims = Claims {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            iat,
            exp,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(TokenError::Sign)
    }

    /// Verify signature, expiry and payload shape.
    pub fn verify(&self, token: &str) -> Result<AuthUser, TokenError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(TokenError::Verify)?;
        Ok(AuthUser {
            id: data.claims.id,
            username: data.claims.username,
            email: data.claims.email,
        })
    }
}
