//! Repository layer for the room service.
//!
//! [`RoomStore`] is the only persistence seam. Every room mutation goes
//! through [`RoomStore::compare_and_swap`], a conditional write on the whole
//! room document keyed by its `version`.
//!
//! Two implementations share the same semantics:
//! - [`PgRoomStore`] for production (PostgreSQL via sqlx)
//! - [`InMemoryRoomStore`] for tests and local runs

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRoomStore;
pub use postgres::PgRoomStore;

use crate::errors::RoomError;
use crate::models::{Message, Room, RoomActivity, UserSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{RoomId, UserId};

/// Persistence operations for rooms, messages and the user directory.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Insert a new room.
    ///
    /// Fails with `RoomError::DuplicateJoinCode` when a non-archived room
    /// already holds the same join code.
    async fn insert_room(&self, room: &Room) -> Result<(), RoomError>;

    /// Whether a non-archived room holds `join_code`.
    async fn join_code_in_use(&self, join_code: &str) -> Result<bool, RoomError>;

    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>, RoomError>;

    /// Resolve a join code to its non-archived room.
    async fn find_by_join_code(&self, join_code: &str) -> Result<Option<Room>, RoomError>;

    /// Replace the stored room if its version still equals `expected_version`.
    ///
    /// On success the stored room is returned with `version` incremented and
    /// `updated_at` refreshed. `None` means the write lost a race (or the
    /// room no longer exists); nothing was written.
    async fn compare_and_swap(
        &self,
        expected_version: i64,
        room: &Room,
    ) -> Result<Option<Room>, RoomError>;

    /// Delete a room and all of its messages.
    ///
    /// Returns `false` if the room was already gone.
    async fn delete_room(&self, room_id: RoomId) -> Result<bool, RoomError>;

    /// Ids of rooms with an `expires_at` at or before `now`.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<RoomId>, RoomError>;

    /// Rooms `user_id` participates in, each with its latest message.
    async fn rooms_for_user(&self, user_id: UserId) -> Result<Vec<RoomActivity>, RoomError>;

    /// Persist a message.
    ///
    /// Fails with `RoomError::NotFound` if the room no longer exists.
    async fn insert_message(&self, message: &Message) -> Result<(), RoomError>;

    /// All messages of a room in persistence order.
    async fn messages_for_room(&self, room_id: RoomId) -> Result<Vec<Message>, RoomError>;

    /// Profiles for the given users. Unknown ids are omitted.
    async fn find_users(&self, user_ids: &[UserId]) -> Result<Vec<UserSummary>, RoomError>;

    /// Connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RoomError>;
}

/// Resolve `user_ids` to profiles in the given order, falling back to an
/// id-only summary for users missing from the directory.
pub async fn resolve_users(
    store: &dyn RoomStore,
    user_ids: &[UserId],
) -> Result<Vec<UserSummary>, RoomError> {
    let found = store.find_users(user_ids).await?;
    Ok(user_ids
        .iter()
        .map(|id| {
            found
                .iter()
                .find(|u| u.id == *id)
                .cloned()
                .unwrap_or_else(|| UserSummary::anonymous(*id))
        })
        .collect())
}
