//! Room coordination services.
//!
//! Each service owns one slice of room behavior and mutates the persisted
//! room only through [`update_room`] or [`update_room_once`], which apply a
//! mutation as a conditional write on the whole room document.

pub mod join;
pub mod lock;
pub mod messaging;
pub mod registry;
pub mod voice_call;

pub use join::{JoinCoordinator, JoinOutcome, JoinTarget};
pub use lock::LockController;
pub use messaging::MessageBroadcaster;
pub use registry::{JoinCodeSource, RandomJoinCodes, RoomRegistry};
pub use voice_call::VoiceCallCoordinator;

use crate::errors::RoomError;
use crate::models::Room;
use crate::observability::metrics;
use crate::repositories::RoomStore;
use common::types::RoomId;

/// Maximum conditional-write attempts before giving up on a contended room.
pub const MAX_CAS_ATTEMPTS: u32 = 8;

/// Result of applying a mutation to a room copy.
pub enum Mutation<T> {
    /// Persist the modified room.
    Write(T),
    /// Nothing to persist; the room is returned as read.
    Skip(T),
}

/// Read a room, apply `mutate` to a copy, and conditionally write it back.
///
/// A lost swap re-reads the room and re-applies `mutate` against the fresh
/// state, so preconditions checked inside `mutate` always hold at the
/// instant of the write. Errors from `mutate` abort without writing.
pub async fn update_room<T, F>(
    store: &dyn RoomStore,
    room_id: RoomId,
    operation: &'static str,
    mutate: F,
) -> Result<(Room, T), RoomError>
where
    F: FnMut(&mut Room) -> Result<Mutation<T>, RoomError>,
{
    apply_mutation(store, room_id, operation, MAX_CAS_ATTEMPTS, mutate).await
}

/// Read a room, apply `mutate` to a copy, and attempt one conditional write
/// against the version that was read.
///
/// For mutations whose outcome depends on the state they replace (a toggle),
/// re-applying after a lost swap would silently act on someone else's write.
/// A lost swap fails with `Conflict` instead.
pub async fn update_room_once<T, F>(
    store: &dyn RoomStore,
    room_id: RoomId,
    operation: &'static str,
    mutate: F,
) -> Result<(Room, T), RoomError>
where
    F: FnMut(&mut Room) -> Result<Mutation<T>, RoomError>,
{
    apply_mutation(store, room_id, operation, 1, mutate).await
}

async fn apply_mutation<T, F>(
    store: &dyn RoomStore,
    room_id: RoomId,
    operation: &'static str,
    max_attempts: u32,
    mut mutate: F,
) -> Result<(Room, T), RoomError>
where
    F: FnMut(&mut Room) -> Result<Mutation<T>, RoomError>,
{
    for attempt in 0..max_attempts {
        let current = store
            .get_room(room_id)
            .await?
            .ok_or_else(|| RoomError::NotFound("Room not found".to_string()))?;

        let mut next = current.clone();
        let value = match mutate(&mut next)? {
            Mutation::Skip(value) => return Ok((current, value)),
            Mutation::Write(value) => value,
        };

        if let Some(stored) = store.compare_and_swap(current.version, &next).await? {
            return Ok((stored, value));
        }

        metrics::record_cas_conflict(operation);
        tracing::debug!(
            target: "room.services",
            room_id = %room_id,
            operation = operation,
            attempt = attempt + 1,
            "Conditional write lost"
        );
    }

    Err(RoomError::Conflict(
        "Room is being modified concurrently, please retry".to_string(),
    ))
}
