//! API error taxonomy and its HTTP mapping.
//!
//! Every handler returns `Result<_, ApiError>`; the `IntoResponse` impl turns
//! each variant into a status code plus a `{"message": ...}` JSON body that
//! the browser client shows verbatim.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use crate::store::StoreError;

/// Shared message for "missing" and "owned by someone else".
pub const TASK_NOT_FOUND_MESSAGE: &str = "Task not found or you don't have permission";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    /// Duplicate username or email.
    #[error("{0}")]
    Conflict(String),

    /// Unknown user or wrong password. One message for both.
    #[error("Invalid username/email or password.")]
    InvalidCredentials,

    #[error("Access denied. No token provided.")]
    MissingToken,

    /// `Authorization` present but not `Bearer <token>`.
    #[error("Access denied. Invalid token.")]
    MalformedAuthorization,

    /// Bad signature, expired, or undecodable payload.
    #[error("Invalid token.")]
    InvalidToken,

    /// The task does not exist or belongs to another user.
    #[error("Task not found or you don't have permission")]
    NotFound,

    /// Body exceeded the gateway's size limit.
    #[error("Request body too large.")]
    PayloadTooLarge,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// HTTP status for this error.
    ///
    /// Bad credentials and a token that fails verification answer 400, while a
    /// missing or unparseable `Authorization` header answers 401.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::Conflict(_)
            | Self::InvalidCredentials
            | Self::InvalidToken => StatusCode::BAD_REQUEST,
            Self::MissingToken | Self::MalformedAuthorization => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Internal(ref detail) = self {
            tracing::error!(error = %detail, "request failed");
        }
        let body = serde_json::json!({ "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}
