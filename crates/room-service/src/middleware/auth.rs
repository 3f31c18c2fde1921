//! Authentication middleware for protected routes.
//!
//! Extracts the session token, validates it with the configured
//! [`SessionAuthenticator`], and injects [`AuthenticatedUser`] into request
//! extensions for downstream handlers.

use crate::auth::SessionAuthenticator;
use crate::errors::RoomError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use common::types::UserId;
use std::sync::Arc;
use tracing::instrument;

/// Fallback header for clients that cannot set `Authorization`.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Arc<dyn SessionAuthenticator>,
}

/// Identity of the caller, set by [`require_auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Bearer token from `Authorization`, or the raw `x-auth-token` header.
fn extract_token(req: &Request) -> Result<&str, RoomError> {
    let headers = req.headers();

    if let Some(value) = headers.get("authorization").and_then(|h| h.to_str().ok()) {
        return value.strip_prefix("Bearer ").ok_or_else(|| {
            tracing::debug!(target: "room.middleware.auth", "Invalid Authorization header format");
            RoomError::InvalidToken("Invalid Authorization header format".to_string())
        });
    }

    headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "room.middleware.auth", "Missing session token");
            RoomError::InvalidToken("No token, authorization denied".to_string())
        })
}

/// Authentication middleware for user sessions.
///
/// # Response
///
/// - Returns 401 Unauthorized if the token is missing or invalid
/// - Continues with `AuthenticatedUser` in extensions otherwise
#[instrument(skip_all, name = "room.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, RoomError> {
    let token = extract_token(&req)?;
    let user_id = state.authenticator.authenticate(token)?;

    req.extensions_mut().insert(AuthenticatedUser { user_id });

    Ok(next.run(req).await)
}
