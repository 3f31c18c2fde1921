//! Membership-granting join protocol.
//!
//! A join appends the user to the room's participants through a conditional
//! write on the room version. Capacity and lock preconditions are evaluated
//! against the exact document being replaced, so no interleaving of joins
//! and lock toggles can push a room past `max_participants`.

use crate::errors::RoomError;
use crate::models::{Room, RoomStatus, JOIN_CODE_LENGTH};
use crate::observability::metrics;
use crate::repositories::RoomStore;
use chrono::{DateTime, Utc};
use common::types::{RoomId, UserId};
use std::sync::Arc;
use tracing::instrument;

use super::MAX_CAS_ATTEMPTS;

/// How the caller identifies the room to join.
#[derive(Debug, Clone)]
pub enum JoinTarget {
    Code(String),
    Room(RoomId),
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub room: Room,
    pub already_member: bool,
}

pub struct JoinCoordinator {
    store: Arc<dyn RoomStore>,
}

/// Why a room cannot take a new participant right now.
fn unavailable_reason(room: &Room, now: DateTime<Utc>) -> Option<&'static str> {
    if room.is_expired_at(now) {
        Some("Room has expired")
    } else if room.is_locked {
        Some("Room is locked")
    } else if room.status == RoomStatus::Archived {
        Some("Room is archived")
    } else if !room.accepts_new_participant(now) {
        Some("Room is full")
    } else {
        None
    }
}

/// Join codes are exactly six ASCII digits.
pub fn is_valid_join_code(code: &str) -> bool {
    code.len() == JOIN_CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

impl JoinCoordinator {
    pub fn new(store: Arc<dyn RoomStore>) -> Self {
        Self { store }
    }

    /// Make `user_id` a participant of the target room.
    ///
    /// A room that is expired, locked, full or archived rejects everyone,
    /// members included. Otherwise joining a room one already belongs to
    /// succeeds without a write. A lost conditional write is re-evaluated
    /// against the fresh room: if it can still take the user the write is
    /// attempted again, otherwise the join fails with `ConcurrentJoinConflict`.
    #[instrument(skip_all, name = "room.services.join", fields(user_id = %user_id))]
    pub async fn join(&self, target: JoinTarget, user_id: UserId) -> Result<JoinOutcome, RoomError> {
        let result = self.try_join(target, user_id).await;
        metrics::record_join(match &result {
            Ok(outcome) if outcome.already_member => "already_member",
            Ok(_) => "joined",
            Err(RoomError::NotFound(_)) => "not_found",
            Err(RoomError::RoomUnavailable(_)) => "unavailable",
            Err(RoomError::ConcurrentJoinConflict) => "conflict",
            Err(_) => "error",
        });
        result
    }

    async fn resolve(&self, target: &JoinTarget) -> Result<Room, RoomError> {
        let room = match target {
            JoinTarget::Code(code) => {
                if !is_valid_join_code(code) {
                    return Err(RoomError::BadRequest(
                        "Join code must be 6 digits".to_string(),
                    ));
                }
                self.store.find_by_join_code(code).await?
            }
            JoinTarget::Room(room_id) => self.store.get_room(*room_id).await?,
        };
        room.ok_or_else(|| RoomError::NotFound("Room not found".to_string()))
    }

    async fn try_join(&self, target: JoinTarget, user_id: UserId) -> Result<JoinOutcome, RoomError> {
        let mut room = self.resolve(&target).await?;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            // Availability first: a member cannot re-enter a room that is
            // locked, full, expired or archived either.
            if let Some(reason) = unavailable_reason(&room, Utc::now()) {
                if attempt == 1 {
                    return Err(RoomError::RoomUnavailable(reason.to_string()));
                }
                tracing::debug!(
                    target: "room.services.join",
                    room_id = %room.id,
                    user_id = %user_id,
                    attempt = attempt,
                    reason = reason,
                    "Room became unavailable while joining"
                );
                return Err(RoomError::ConcurrentJoinConflict);
            }

            if room.is_participant(user_id) {
                return Ok(JoinOutcome {
                    room,
                    already_member: true,
                });
            }

            let joined = room.with_participant(user_id);
            if let Some(stored) = self.store.compare_and_swap(room.version, &joined).await? {
                tracing::info!(
                    target: "room.services.join",
                    room_id = %stored.id,
                    user_id = %user_id,
                    participants = stored.participants.len(),
                    status = stored.status.as_str(),
                    "User joined room"
                );
                return Ok(JoinOutcome {
                    room: stored,
                    already_member: false,
                });
            }

            metrics::record_cas_conflict("join");
            room = self
                .store
                .get_room(room.id)
                .await?
                .ok_or_else(|| RoomError::NotFound("Room not found".to_string()))?;
        }

        Err(RoomError::ConcurrentJoinConflict)
    }
}
