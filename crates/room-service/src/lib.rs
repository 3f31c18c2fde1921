//! Room Service Library
//!
//! Core of the Roomkey service: ephemeral, code-joined rooms with real-time
//! text chat, manual locking, and voice-call signaling relayed between
//! participants.
//!
//! # Architecture
//!
//! Request-style operations follow the Handler -> Service -> Repository
//! pattern. The real-time channel enters through `realtime` and reaches the
//! same services.
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs  -> services/*.rs -> repositories/*.rs
//!               -> realtime/ws.rs -> services/*.rs, presence/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Session token verification
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Authentication and HTTP metrics middleware
//! - `models` - Room, message and wire models
//! - `observability` - Prometheus metrics
//! - `presence` - Connection registry and room fan-out
//! - `realtime` - WebSocket endpoint and per-connection dispatch
//! - `repositories` - Persistence (PostgreSQL and in-memory)
//! - `routes` - Axum router setup
//! - `services` - Room lifecycle, joins, locking, calls and messaging
//! - `tasks` - Background expiry sweeper

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod presence;
pub mod realtime;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
