//! Room creation, lookup and deletion.

use crate::errors::RoomError;
use crate::models::{
    ExpiresIn, Room, RoomDetailsResponse, RoomHistoryEntry, UserSummary,
    DEFAULT_MAX_PARTICIPANTS, MAX_MAX_PARTICIPANTS, MIN_MAX_PARTICIPANTS,
};
use crate::observability::metrics;
use crate::presence::PresenceTracker;
use crate::repositories::{resolve_users, RoomStore};
use chrono::Utc;
use common::types::{RoomId, UserId};
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::instrument;

/// Join code allocation attempts before giving up with `CodeExhausted`.
pub const MAX_JOIN_CODE_ATTEMPTS: u32 = 64;

/// Lowest six-digit code; codes never start with zero.
const JOIN_CODE_FLOOR: u32 = 100_000;

/// Number of distinct six-digit codes.
const JOIN_CODE_SPACE: u32 = 900_000;

/// Source of candidate join codes.
pub trait JoinCodeSource: Send + Sync {
    fn next_code(&self) -> Result<String, RoomError>;
}

/// Uniformly random six-digit codes from the system CSPRNG.
pub struct RandomJoinCodes {
    rng: SystemRandom,
}

impl RandomJoinCodes {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for RandomJoinCodes {
    fn default() -> Self {
        Self::new()
    }
}

impl JoinCodeSource for RandomJoinCodes {
    fn next_code(&self) -> Result<String, RoomError> {
        let mut bytes = [0u8; 4];
        self.rng.fill(&mut bytes).map_err(|e| {
            tracing::error!(target: "room.services.registry", error = %e, "Failed to generate random bytes for join code");
            RoomError::Internal("RNG failure".to_string())
        })?;

        let value = u32::from_be_bytes(bytes);
        Ok((JOIN_CODE_FLOOR + value % JOIN_CODE_SPACE).to_string())
    }
}

/// Owns room creation and read access to room state.
pub struct RoomRegistry {
    store: Arc<dyn RoomStore>,
    presence: Arc<PresenceTracker>,
    codes: Arc<dyn JoinCodeSource>,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn RoomStore>, presence: Arc<PresenceTracker>) -> Self {
        Self::with_code_source(store, presence, Arc::new(RandomJoinCodes::new()))
    }

    pub fn with_code_source(
        store: Arc<dyn RoomStore>,
        presence: Arc<PresenceTracker>,
        codes: Arc<dyn JoinCodeSource>,
    ) -> Self {
        Self {
            store,
            presence,
            codes,
        }
    }

    /// Create a room owned by `creator` with a freshly allocated join code.
    ///
    /// `expires_in` labels other than `10m`, `1h` and `24h` mean the room
    /// never expires.
    #[instrument(skip_all, name = "room.services.create_room", fields(creator = %creator))]
    pub async fn create_room(
        &self,
        creator: UserId,
        max_participants: Option<i32>,
        expires_in: Option<&str>,
    ) -> Result<Room, RoomError> {
        let max_participants = max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS);
        if !(MIN_MAX_PARTICIPANTS..=MAX_MAX_PARTICIPANTS).contains(&max_participants) {
            return Err(RoomError::BadRequest(format!(
                "maxParticipants must be between {MIN_MAX_PARTICIPANTS} and {MAX_MAX_PARTICIPANTS}"
            )));
        }

        let now = Utc::now();
        let expires_at = expires_in
            .and_then(ExpiresIn::parse)
            .map(|lifetime| now + lifetime.duration());

        for attempt in 1..=MAX_JOIN_CODE_ATTEMPTS {
            let code = self.codes.next_code()?;
            if self.store.join_code_in_use(&code).await? {
                tracing::debug!(
                    target: "room.services.registry",
                    attempt = attempt,
                    "Join code in use, retrying"
                );
                continue;
            }

            let room = Room::new(creator, code, max_participants, expires_at, now);
            match self.store.insert_room(&room).await {
                Ok(()) => {
                    metrics::record_room_created(attempt);
                    tracing::info!(
                        target: "room.services.registry",
                        room_id = %room.id,
                        user_id = %creator,
                        max_participants = max_participants,
                        expires_at = ?room.expires_at,
                        "Room created"
                    );
                    return Ok(room);
                }
                // Another room claimed the code between check and insert
                Err(RoomError::DuplicateJoinCode) => {
                    tracing::debug!(
                        target: "room.services.registry",
                        attempt = attempt,
                        "Join code collision on insert, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        tracing::error!(
            target: "room.services.registry",
            attempts = MAX_JOIN_CODE_ATTEMPTS,
            "Join code space exhausted"
        );
        Err(RoomError::CodeExhausted)
    }

    pub async fn get_room(&self, room_id: RoomId) -> Result<Room, RoomError> {
        self.store
            .get_room(room_id)
            .await?
            .ok_or_else(|| RoomError::NotFound("Room not found".to_string()))
    }

    /// The room, if `user_id` is one of its participants.
    pub async fn room_for_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Room, RoomError> {
        let room = self.get_room(room_id).await?;
        if !room.is_participant(user_id) {
            return Err(RoomError::Forbidden(
                "You are not a participant of this room".to_string(),
            ));
        }
        Ok(room)
    }

    /// Room details with participant profiles, for participants only.
    #[instrument(skip_all, name = "room.services.room_details", fields(room_id = %room_id))]
    pub async fn room_details(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<RoomDetailsResponse, RoomError> {
        let room = self.room_for_participant(room_id, user_id).await?;
        let participants = resolve_users(self.store.as_ref(), &room.participants).await?;
        let creator = participants
            .iter()
            .find(|p| p.id == room.creator)
            .cloned()
            .unwrap_or_else(|| UserSummary::anonymous(room.creator));

        Ok(RoomDetailsResponse {
            room_id: room.id,
            status: room.effective_status(Utc::now()),
            join_code: room.join_code,
            creator,
            participants,
            is_locked: room.is_locked,
            max_participants: room.max_participants,
            expires_at: room.expires_at,
            voice_call: room.voice_call,
            created_at: room.created_at,
        })
    }

    /// Delete a room and its messages. Only the creator may do this.
    ///
    /// Live subscribers receive `roomClosed`.
    #[instrument(skip_all, name = "room.services.delete_room", fields(room_id = %room_id))]
    pub async fn delete_room(&self, room_id: RoomId, requester: UserId) -> Result<(), RoomError> {
        let room = self.get_room(room_id).await?;
        if room.creator != requester {
            return Err(RoomError::Forbidden(
                "Only the room creator can delete the room".to_string(),
            ));
        }

        if self.store.delete_room(room_id).await? {
            tracing::info!(
                target: "room.services.registry",
                room_id = %room_id,
                user_id = %requester,
                "Room deleted"
            );
        }
        self.presence.close_room(room_id).await;
        Ok(())
    }

    /// The caller's rooms, most recently active first.
    #[instrument(skip_all, name = "room.services.history", fields(user_id = %user_id))]
    pub async fn history(&self, user_id: UserId) -> Result<Vec<RoomHistoryEntry>, RoomError> {
        let activities = self.store.rooms_for_user(user_id).await?;

        let others: Vec<UserId> = activities
            .iter()
            .filter_map(|a| a.room.other_participant(user_id))
            .collect();
        let profiles = resolve_users(self.store.as_ref(), &others).await?;

        let now = Utc::now();
        let mut entries: Vec<RoomHistoryEntry> = activities
            .into_iter()
            .map(|activity| {
                let last_activity = activity.last_activity();
                let other_participant = activity
                    .room
                    .other_participant(user_id)
                    .and_then(|other| profiles.iter().find(|p| p.id == other).cloned());
                RoomHistoryEntry {
                    room_id: activity.room.id,
                    status: activity.room.effective_status(now),
                    join_code: activity.room.join_code,
                    is_locked: activity.room.is_locked,
                    last_activity,
                    last_message: activity.last_message,
                    other_participant,
                }
            })
            .collect();

        entries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(entries)
    }
}
