//! Background tasks for the room service.
//!
//! - `expiry_sweeper` - Deletes rooms past their expiry, messages included

pub mod expiry_sweeper;

pub use expiry_sweeper::{start_expiry_sweeper, sweep_expired_rooms, SweepReport};
