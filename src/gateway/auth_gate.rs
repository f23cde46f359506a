//! Bearer-token gate for the task routes.
//!
//! Runs as route middleware: on success the verified [`AuthUser`] is stored in
//! the request extensions, and handlers read it with `Extension<AuthUser>`.
//! The owner id for every task operation comes from there, never the body.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;

use super::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

/// Reject the request unless it carries a valid `Authorization: Bearer <token>`.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())?;
    let user: AuthUser = state.auth.verify(token)?;
    tracing::debug!(user_id = %user.id, "request authenticated");
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Extract the token from the `Authorization` header.
///
/// No header is `MissingToken`; anything other than `Bearer <token>` is
/// `MalformedAuthorization`. Signature checks happen later.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(ApiError::MissingToken)?;
    let value = value
        .to_str()
        .map_err(|_| ApiError::MalformedAuthorization)?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(ApiError::MalformedAuthorization)?;
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(ApiError::MalformedAuthorization);
    }
    Ok(token)
}
