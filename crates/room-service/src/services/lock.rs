//! Manual room lock.

use crate::errors::RoomError;
use crate::models::Room;
use crate::presence::{Audience, PresenceTracker, ServerEvent};
use crate::repositories::RoomStore;
use common::types::{RoomId, UserId};
use std::sync::Arc;
use tracing::instrument;

use super::{update_room_once, Mutation};

pub struct LockController {
    store: Arc<dyn RoomStore>,
    presence: Arc<PresenceTracker>,
}

impl LockController {
    pub fn new(store: Arc<dyn RoomStore>, presence: Arc<PresenceTracker>) -> Self {
        Self { store, presence }
    }

    /// Flip the room's manual lock and return the new state.
    ///
    /// Only the creator may toggle. Locking needs at least two participants;
    /// unlocking is always allowed. The flip is written against the version
    /// that was read; if another write lands first the toggle fails with
    /// `Conflict` and nothing is broadcast.
    #[instrument(skip_all, name = "room.services.toggle_lock", fields(room_id = %room_id))]
    pub async fn toggle_lock(&self, room_id: RoomId, requester: UserId) -> Result<bool, RoomError> {
        let toggle = |room: &mut Room| {
            if room.creator != requester {
                return Err(RoomError::Forbidden(
                    "Only the room creator can lock or unlock the room".to_string(),
                ));
            }
            if !room.is_locked && room.participants.len() < 2 {
                return Err(RoomError::InvalidState(
                    "Cannot lock a room with fewer than 2 participants".to_string(),
                ));
            }
            room.is_locked = !room.is_locked;
            Ok(Mutation::Write(room.is_locked))
        };
        let (room, is_locked) =
            update_room_once(self.store.as_ref(), room_id, "toggle_lock", toggle).await?;

        tracing::info!(
            target: "room.services.lock",
            room_id = %room.id,
            user_id = %requester,
            is_locked = is_locked,
            "Room lock toggled"
        );

        self.presence
            .broadcast(
                room.id,
                ServerEvent::RoomStateChanged {
                    room_id: room.id,
                    is_locked,
                },
                Audience::Everyone,
            )
            .await;

        Ok(is_locked)
    }
}
