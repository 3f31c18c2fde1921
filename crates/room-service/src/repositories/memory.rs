//! In-memory room store.
//!
//! Used by tests and local runs. All state sits behind one `RwLock`, so each
//! operation is atomic with respect to the others, matching the per-row
//! transactional guarantees of the PostgreSQL store.

use crate::errors::RoomError;
use crate::models::{Message, Room, RoomActivity, RoomStatus, UserSummary};
use crate::repositories::RoomStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{RoomId, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    rooms: HashMap<RoomId, Room>,
    messages: HashMap<RoomId, Vec<Message>>,
    users: HashMap<UserId, UserSummary>,
}

impl MemoryState {
    fn code_holder(&self, join_code: &str) -> Option<&Room> {
        self.rooms
            .values()
            .find(|r| r.join_code == join_code && r.status != RoomStatus::Archived)
    }
}

/// Room store backed by process memory.
#[derive(Default)]
pub struct InMemoryRoomStore {
    state: RwLock<MemoryState>,
}

impl InMemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user directory entry.
    pub async fn upsert_user(&self, user: UserSummary) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// Number of messages stored for a room (zero once the room is deleted).
    pub async fn message_count(&self, room_id: RoomId) -> usize {
        self.state
            .read()
            .await
            .messages
            .get(&room_id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl RoomStore for InMemoryRoomStore {
    async fn insert_room(&self, room: &Room) -> Result<(), RoomError> {
        let mut state = self.state.write().await;
        if room.status != RoomStatus::Archived && state.code_holder(&room.join_code).is_some() {
            return Err(RoomError::DuplicateJoinCode);
        }
        if state.rooms.contains_key(&room.id) {
            return Err(RoomError::Conflict("Room already exists".to_string()));
        }
        state.rooms.insert(room.id, room.clone());
        state.messages.insert(room.id, Vec::new());
        Ok(())
    }

    async fn join_code_in_use(&self, join_code: &str) -> Result<bool, RoomError> {
        Ok(self.state.read().await.code_holder(join_code).is_some())
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>, RoomError> {
        Ok(self.state.read().await.rooms.get(&room_id).cloned())
    }

    async fn find_by_join_code(&self, join_code: &str) -> Result<Option<Room>, RoomError> {
        Ok(self.state.read().await.code_holder(join_code).cloned())
    }

    async fn compare_and_swap(
        &self,
        expected_version: i64,
        room: &Room,
    ) -> Result<Option<Room>, RoomError> {
        let mut state = self.state.write().await;
        let Some(stored) = state.rooms.get_mut(&room.id) else {
            return Ok(None);
        };
        if stored.version != expected_version {
            return Ok(None);
        }

        let mut next = room.clone();
        next.version = expected_version + 1;
        next.updated_at = Utc::now();
        *stored = next.clone();
        Ok(Some(next))
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<bool, RoomError> {
        let mut state = self.state.write().await;
        state.messages.remove(&room_id);
        Ok(state.rooms.remove(&room_id).is_some())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<RoomId>, RoomError> {
        Ok(self
            .state
            .read()
            .await
            .rooms
            .values()
            .filter(|r| r.is_expired_at(now))
            .map(|r| r.id)
            .collect())
    }

    async fn rooms_for_user(&self, user_id: UserId) -> Result<Vec<RoomActivity>, RoomError> {
        let state = self.state.read().await;
        Ok(state
            .rooms
            .values()
            .filter(|r| r.is_participant(user_id))
            .map(|room| RoomActivity {
                room: room.clone(),
                last_message: state
                    .messages
                    .get(&room.id)
                    .and_then(|messages| messages.last().cloned()),
            })
            .collect())
    }

    async fn insert_message(&self, message: &Message) -> Result<(), RoomError> {
        let mut state = self.state.write().await;
        if !state.rooms.contains_key(&message.room_id) {
            return Err(RoomError::NotFound("Room not found".to_string()));
        }
        state
            .messages
            .entry(message.room_id)
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn messages_for_room(&self, room_id: RoomId) -> Result<Vec<Message>, RoomError> {
        Ok(self
            .state
            .read()
            .await
            .messages
            .get(&room_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_users(&self, user_ids: &[UserId]) -> Result<Vec<UserSummary>, RoomError> {
        let state = self.state.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    async fn ping(&self) -> Result<(), RoomError> {
        Ok(())
    }
}
