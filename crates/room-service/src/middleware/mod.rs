//! HTTP middleware for the room service.
//!
//! - `auth` - session token check for protected routes
//! - `http_metrics` - request metrics for every response

pub mod auth;
pub mod http_metrics;

pub use auth::{require_auth, AuthState, AuthenticatedUser};
pub use http_metrics::http_metrics_middleware;
