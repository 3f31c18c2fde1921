//! Session authentication.
//!
//! Every privileged HTTP request and every real-time connection presents a
//! bearer credential. A [`SessionAuthenticator`] turns it into a stable
//! [`UserId`] or rejects it with `RoomError::InvalidToken`.

pub mod jwt;

pub use jwt::JwtAuthenticator;

use crate::errors::RoomError;
use common::types::UserId;

/// Validates bearer credentials.
pub trait SessionAuthenticator: Send + Sync {
    /// Resolve a credential to the user it was issued to.
    fn authenticate(&self, token: &str) -> Result<UserId, RoomError>;
}

/// Client-facing message for every credential failure.
pub const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

pub(crate) fn invalid_token() -> RoomError {
    RoomError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
}
