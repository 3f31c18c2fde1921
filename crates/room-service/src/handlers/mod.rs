//! HTTP request handlers for the room service.

pub mod health;
pub mod metrics;
pub mod rooms;

pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use rooms::{
    create_room, delete_room, end_call, get_room, join_room, room_history, start_call,
    toggle_lock,
};
