//! Live connection presence.
//!
//! [`PresenceTracker`] binds real-time connections to rooms and fans room
//! events out to them. [`events`] defines the wire format of the channel.

pub mod events;
pub mod tracker;

pub use events::{ClientEvent, ServerEvent, SignalKind};
pub use tracker::{Audience, Connection, PresenceTracker};
