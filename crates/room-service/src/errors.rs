//! Room service error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl,
//! and to a client-facing message for real-time `error` events. Server-class
//! errors never expose their detail to clients; it is logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error classes callers reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input, correctable by the user.
    Validation,
    /// Missing/invalid credential or insufficient privilege.
    Auth,
    /// Unknown room or join code.
    NotFound,
    /// Lost race or incompatible state; re-query before retrying.
    Conflict,
    /// Unexpected or persistence failure.
    Server,
}

/// Room service error type.
///
/// Maps to HTTP status codes:
/// - BadRequest, InvalidState: 400 Bad Request
/// - InvalidToken: 401 Unauthorized
/// - Forbidden, RoomUnavailable: 403 Forbidden
/// - NotFound: 404 Not Found
/// - Conflict, ConcurrentJoinConflict, DuplicateJoinCode: 409 Conflict
/// - CodeExhausted: 503 Service Unavailable
/// - Database, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Room unavailable: {0}")]
    RoomUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Room became full or locked while joining")]
    ConcurrentJoinConflict,

    #[error("Join code already assigned to another room")]
    DuplicateJoinCode,

    #[error("Unable to allocate a unique join code")]
    CodeExhausted,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// Returns the error class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::BadRequest(_) | RoomError::InvalidState(_) => ErrorKind::Validation,
            RoomError::InvalidToken(_)
            | RoomError::Forbidden(_)
            | RoomError::RoomUnavailable(_) => ErrorKind::Auth,
            RoomError::NotFound(_) => ErrorKind::NotFound,
            RoomError::Conflict(_)
            | RoomError::ConcurrentJoinConflict
            | RoomError::DuplicateJoinCode => ErrorKind::Conflict,
            RoomError::CodeExhausted | RoomError::Database(_) | RoomError::Internal(_) => {
                ErrorKind::Server
            }
        }
    }

    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            RoomError::BadRequest(_) | RoomError::InvalidState(_) => 400,
            RoomError::InvalidToken(_) => 401,
            RoomError::Forbidden(_) | RoomError::RoomUnavailable(_) => 403,
            RoomError::NotFound(_) => 404,
            RoomError::Conflict(_)
            | RoomError::ConcurrentJoinConflict
            | RoomError::DuplicateJoinCode => 409,
            RoomError::CodeExhausted => 503,
            RoomError::Database(_) | RoomError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code used in response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RoomError::BadRequest(_) => "BAD_REQUEST",
            RoomError::InvalidState(_) => "INVALID_STATE",
            RoomError::InvalidToken(_) => "INVALID_TOKEN",
            RoomError::Forbidden(_) => "FORBIDDEN",
            RoomError::RoomUnavailable(_) => "ROOM_UNAVAILABLE",
            RoomError::NotFound(_) => "NOT_FOUND",
            RoomError::Conflict(_) => "CONFLICT",
            RoomError::ConcurrentJoinConflict => "CONCURRENT_JOIN_CONFLICT",
            RoomError::DuplicateJoinCode => "DUPLICATE_JOIN_CODE",
            RoomError::CodeExhausted => "CODE_EXHAUSTED",
            RoomError::Database(_) => "DATABASE_ERROR",
            RoomError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to a client.
    pub fn client_message(&self) -> String {
        match self {
            RoomError::BadRequest(msg)
            | RoomError::InvalidState(msg)
            | RoomError::InvalidToken(msg)
            | RoomError::Forbidden(msg)
            | RoomError::RoomUnavailable(msg)
            | RoomError::NotFound(msg)
            | RoomError::Conflict(msg) => msg.clone(),
            RoomError::ConcurrentJoinConflict | RoomError::DuplicateJoinCode => self.to_string(),
            RoomError::CodeExhausted => "Service temporarily unavailable".to_string(),
            RoomError::Database(_) => "An internal database error occurred".to_string(),
            RoomError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Log server-class errors with their detail.
    pub fn log_if_server_error(&self) {
        match self {
            RoomError::Database(err) => {
                tracing::error!(target: "room.database", error = %err, "Database operation failed");
            }
            RoomError::Internal(err) => {
                tracing::error!(target: "room.internal", error = %err, "Internal error");
            }
            RoomError::CodeExhausted => {
                tracing::warn!(target: "room.availability", "Join code space exhausted");
            }
            _ => {}
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        self.log_if_server_error();

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.client_message(),
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) = "Bearer realm=\"roomkey\", error=\"invalid_token\"".parse() {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

/// Convert sqlx errors to RoomError
impl From<sqlx::Error> for RoomError {
    fn from(err: sqlx::Error) -> Self {
        RoomError::Database(err.to_string())
    }
}
