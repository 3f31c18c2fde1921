//! Voice call state machine and WebRTC signaling relay.
//!
//! A room's call is either idle or active. Every transition, and every
//! per-participant change (mic access, mute), is a conditional write on the
//! whole room, so two participants muting at once never lose an update.
//!
//! Signaling messages are routed without inspecting their payload.

use crate::errors::RoomError;
use crate::models::{Room, VoiceCallState};
use crate::presence::{Audience, PresenceTracker, ServerEvent, SignalKind};
use crate::repositories::RoomStore;
use common::types::{ConnectionId, RoomId, UserId};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

use super::{update_room, Mutation};

pub struct VoiceCallCoordinator {
    store: Arc<dyn RoomStore>,
    presence: Arc<PresenceTracker>,
}

fn no_active_call() -> RoomError {
    RoomError::InvalidState("No active call in this room".to_string())
}

/// The current host, treating "inactive" and "no host" alike.
fn active_host(room: &Room) -> Result<UserId, RoomError> {
    match room.voice_call.host {
        Some(host) if room.voice_call.is_active => Ok(host),
        _ => Err(no_active_call()),
    }
}

impl VoiceCallCoordinator {
    pub fn new(store: Arc<dyn RoomStore>, presence: Arc<PresenceTracker>) -> Self {
        Self { store, presence }
    }

    /// Start a call hosted by the room creator.
    ///
    /// Every current member joins the call muted; only the host has mic access.
    #[instrument(skip_all, name = "room.services.start_call", fields(room_id = %room_id))]
    pub async fn start_call(
        &self,
        room_id: RoomId,
        requester: UserId,
    ) -> Result<VoiceCallState, RoomError> {
        let (room, ()) = update_room(self.store.as_ref(), room_id, "start_call", |room| {
            if room.creator != requester {
                return Err(RoomError::Forbidden(
                    "Only the room creator can start a call".to_string(),
                ));
            }
            if room.voice_call.is_active {
                return Err(RoomError::Conflict("A call is already active".to_string()));
            }
            room.voice_call = VoiceCallState::started(requester, &room.participants);
            Ok(Mutation::Write(()))
        })
        .await?;

        tracing::info!(
            target: "room.services.voice_call",
            room_id = %room.id,
            host = %requester,
            participants = room.voice_call.participants.len(),
            "Call started"
        );

        self.presence
            .broadcast(
                room.id,
                ServerEvent::CallStarted {
                    room_id: room.id,
                    voice_call: room.voice_call.clone(),
                },
                Audience::Everyone,
            )
            .await;

        Ok(room.voice_call)
    }

    /// End the active call. Only its host may do this.
    #[instrument(skip_all, name = "room.services.end_call", fields(room_id = %room_id))]
    pub async fn end_call(
        &self,
        room_id: RoomId,
        requester: UserId,
    ) -> Result<VoiceCallState, RoomError> {
        let (room, ()) = update_room(self.store.as_ref(), room_id, "end_call", |room| {
            if active_host(room)? != requester {
                return Err(RoomError::Forbidden(
                    "Only the call host can end the call".to_string(),
                ));
            }
            room.voice_call = VoiceCallState::default();
            Ok(Mutation::Write(()))
        })
        .await?;

        tracing::info!(
            target: "room.services.voice_call",
            room_id = %room.id,
            user_id = %requester,
            "Call ended"
        );

        self.presence
            .broadcast(
                room.id,
                ServerEvent::CallEnded {
                    room_id: room.id,
                    voice_call: room.voice_call.clone(),
                },
                Audience::Everyone,
            )
            .await;

        Ok(room.voice_call)
    }

    /// Grant or revoke a call participant's mic access. Host only.
    ///
    /// Returns `false` without writing or broadcasting when the target is
    /// not in the call.
    #[instrument(skip_all, name = "room.services.grant_mic_access", fields(room_id = %room_id))]
    pub async fn grant_mic_access(
        &self,
        room_id: RoomId,
        requester: UserId,
        target: UserId,
        granted: bool,
    ) -> Result<bool, RoomError> {
        let (_, applied) = update_room(self.store.as_ref(), room_id, "grant_mic_access", |room| {
            if active_host(room)? != requester {
                return Err(RoomError::Forbidden(
                    "Only the call host can change mic access".to_string(),
                ));
            }
            match room.voice_call.participant_mut(target) {
                Some(participant) => {
                    participant.mic_access = granted;
                    Ok(Mutation::Write(true))
                }
                None => Ok(Mutation::Skip(false)),
            }
        })
        .await?;

        if !applied {
            tracing::debug!(
                target: "room.services.voice_call",
                room_id = %room_id,
                target_user_id = %target,
                "Mic access target is not in the call"
            );
            return Ok(false);
        }

        self.presence
            .broadcast(
                room_id,
                ServerEvent::MicAccessChanged {
                    room_id,
                    user_id: target,
                    has_mic_access: granted,
                },
                Audience::Everyone,
            )
            .await;

        Ok(true)
    }

    /// Set the caller's own mute state. Others are notified; the caller is not.
    #[instrument(skip_all, name = "room.services.set_muted", fields(room_id = %room_id))]
    pub async fn set_muted(
        &self,
        room_id: RoomId,
        user_id: UserId,
        is_muted: bool,
    ) -> Result<(), RoomError> {
        update_room(self.store.as_ref(), room_id, "set_muted", |room| {
            active_host(room)?;
            let participant = room.voice_call.participant_mut(user_id).ok_or_else(|| {
                RoomError::Forbidden("You are not a participant of this call".to_string())
            })?;
            participant.is_muted = is_muted;
            Ok(Mutation::Write(()))
        })
        .await?;

        self.presence
            .broadcast(
                room_id,
                ServerEvent::MuteStatusChanged {
                    room_id,
                    user_id,
                    is_muted,
                },
                Audience::ExceptUser(user_id),
            )
            .await;

        Ok(())
    }

    /// Forward a signaling message to the target user's connections in the
    /// sender's room.
    ///
    /// Returns the number of connections reached. A target with no live
    /// connection gets nothing; the message is not queued.
    pub async fn relay_signal(
        &self,
        connection_id: ConnectionId,
        kind: SignalKind,
        target: UserId,
        payload: Value,
    ) -> Result<usize, RoomError> {
        let sender = self
            .presence
            .user_for(connection_id)
            .await
            .ok_or_else(|| RoomError::Internal("Unknown connection".to_string()))?;
        let room_id = self.presence.bound_room(connection_id).await.ok_or_else(|| {
            RoomError::Forbidden("Join a room before sending call signals".to_string())
        })?;

        let delivered = self
            .presence
            .broadcast(
                room_id,
                kind.into_event(sender, payload),
                Audience::OnlyUser(target),
            )
            .await;

        if delivered == 0 {
            tracing::debug!(
                target: "room.services.voice_call",
                room_id = %room_id,
                target_user_id = %target,
                "Signal target not connected, dropping"
            );
        }

        Ok(delivered)
    }
}
