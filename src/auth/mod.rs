//! User registration, login, and bearer-token verification.
//!
//! Provides:
//! - Registration with username/email/password (PBKDF2-SHA256 + per-user salt)
//! - Login by username OR email with a single, non-revealing failure message
//! - Stateless HS256 tokens carrying `{id, username, email}`, 1-day expiry
//!
//! ## Design Decisions
//! - Tokens are not stored server-side; expiry is the only revocation.
//! - Password hashing runs on the blocking pool so it never stalls the
//!   async workers.

pub mod password;
pub mod store;
pub mod token;

pub use password::{verify_password, PasswordPolicy};
pub use store::{NewUser, SqliteUserStore, User, UserStore};
pub use token::{AuthUser, TokenIssuer};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::store::StoreError;

const REGISTER_FIELDS_REQUIRED: &str = "Username, email, and password are required.";
const LOGIN_FIELDS_REQUIRED: &str = "Username and password are required.";

/// Body of `POST /api/auth/register`. Fields are optional so a missing one
/// becomes a validation error rather than a JSON rejection.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Body of `POST /api/auth/login`. `username` also accepts an email address.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A freshly issued token and the identity it encodes.
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user: AuthUser,
}

pub struct Authenticator {
    users: Arc<dyn UserStore>,
    tokens: TokenIssuer,
    passwords: PasswordPolicy,
}

impl Authenticator {
    pub fn new(users: Arc<dyn UserStore>, tokens: TokenIssuer, passwords: PasswordPolicy) -> Self {
        Self {
            users,
            tokens,
            passwords,
        }
    }

    /// Create an account and log it in.
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthSession, ApiError> {
        let (Some(username), Some(email), Some(password)) = (
            non_blank(request.username),
            non_blank(request.email),
            request.password.filter(|p| !p.is_empty()),
        ) else {
            return Err(ApiError::validation(REGISTER_FIELDS_REQUIRED));
        };

        if let Some(existing) = self
            .users
            .find_by_username_or_email(&username, &email)
            .await?
        {
            let field = if existing.username == username {
                "username"
            } else {
                "email"
            };
            tracing::debug!(field, "registration rejected: duplicate");
            return Err(conflict_for(field));
        }

        let policy = self.passwords;
        let password_hash = run_blocking(move || policy.hash(&password))
            .await?
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?;

        let user = match self
            .users
            .insert(NewUser {
                username,
                email,
                password_hash,
            })
            .await
        {
            Ok(user) => user,
            Err(StoreError::Duplicate { field }) => return Err(conflict_for(&field)),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id = %user.id, username = %user.username, "user registered");
        self.session_for(&user)
    }

    /// Authenticate by username or email plus password.
    ///
    /// Unknown user and wrong password fail identically; a throwaway hash is
    /// computed for unknown users so response time does not tell them apart.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthSession, ApiError> {
        let (Some(login), Some(password)) = (non_blank(request.username), request.password) else {
            return Err(ApiError::validation(LOGIN_FIELDS_REQUIRED));
        };

        let candidate = self.users.find_by_login(&login).await?;
        let policy = self.passwords;
        let user = run_blocking(move || match candidate {
            Some(user) => verify_password(&password, &user.password_hash).then_some(user),
            None => {
                let _ = policy.hash(&password);
                None
            }
        })
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

        tracing::info!(user_id = %user.id, "user logged in");
        self.session_for(&user)
    }

    /// Verify a bearer token and return the identity it carries.
    pub fn verify(&self, token: &str) -> Result<AuthUser, ApiError> {
        self.tokens.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "bearer token rejected");
            ApiError::InvalidToken
        })
    }

    fn session_for(&self, user: &User) -> Result<AuthSession, ApiError> {
        let identity = AuthUser {
            id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
        };
        let token = self
            .tokens
            .issue(&identity)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(AuthSession {
            token,
            user: identity,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn conflict_for(field: &str) -> ApiError {
    match field {
        "username" => ApiError::conflict("Username already exists."),
        "email" => ApiError::conflict("Email already exists."),
        other => ApiError::conflict(format!("{other} already exists.")),
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("password worker failed: {e}")))
}
