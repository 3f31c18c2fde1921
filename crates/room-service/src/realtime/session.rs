//! Per-connection event dispatch.
//!
//! A session handles one inbound frame at a time. Failures never close the
//! connection; they come back to the sender as an `error` event.

use crate::errors::RoomError;
use crate::observability::metrics;
use crate::presence::{ClientEvent, ServerEvent, SignalKind};
use crate::routes::AppState;
use common::types::{ConnectionId, UserId};
use std::sync::Arc;
use tracing::instrument;

/// Client-facing message for frames that are not a known event.
pub const INVALID_FRAME_MESSAGE: &str = "Invalid event format";

pub struct RealtimeSession {
    state: Arc<AppState>,
    connection_id: ConnectionId,
    user_id: UserId,
}

impl RealtimeSession {
    pub fn new(state: Arc<AppState>, connection_id: ConnectionId, user_id: UserId) -> Self {
        Self {
            state,
            connection_id,
            user_id,
        }
    }

    /// Parse and handle one text frame.
    pub async fn handle_frame(&self, text: &str) {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(
                    target: "room.realtime",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Malformed client frame"
                );
                self.reject_frame().await;
                return;
            }
        };

        let name = event.name();
        match self.dispatch(event).await {
            Ok(()) => metrics::record_realtime_event(name, "success"),
            Err(e) => {
                metrics::record_realtime_event(name, "error");
                e.log_if_server_error();
                tracing::debug!(
                    target: "room.realtime",
                    connection_id = %self.connection_id,
                    user_id = %self.user_id,
                    event = name,
                    error = %e,
                    "Client event rejected"
                );
                self.reply(ServerEvent::error(e.client_message())).await;
            }
        }
    }

    /// Answer a frame that cannot carry an event (malformed or binary).
    pub async fn reject_frame(&self) {
        metrics::record_realtime_event("invalid", "error");
        self.reply(ServerEvent::error(INVALID_FRAME_MESSAGE)).await;
    }

    #[instrument(skip_all, name = "room.realtime.dispatch", fields(connection_id = %self.connection_id, event = event.name()))]
    async fn dispatch(&self, event: ClientEvent) -> Result<(), RoomError> {
        let state = &self.state;
        let user = self.user_id;

        match event {
            ClientEvent::JoinRoom { room_id } => {
                state.presence.on_join_room(self.connection_id, room_id).await
            }
            ClientEvent::SendMessage { room_id, content } => {
                state.messages.send(room_id, user, &content).await.map(|_| ())
            }
            ClientEvent::ToggleLockRoom { room_id } => {
                state.locks.toggle_lock(room_id, user).await.map(|_| ())
            }
            ClientEvent::Typing { room_id, is_typing } => state
                .presence
                .relay_typing(self.connection_id, room_id, is_typing)
                .await
                .map(|_| ()),
            ClientEvent::StartCall { room_id } => {
                state.calls.start_call(room_id, user).await.map(|_| ())
            }
            ClientEvent::EndCall { room_id } => state.calls.end_call(room_id, user).await.map(|_| ()),
            ClientEvent::WebrtcOffer {
                target_user_id,
                payload,
            } => self.relay(SignalKind::Offer, target_user_id, payload).await,
            ClientEvent::WebrtcAnswer {
                target_user_id,
                payload,
            } => self.relay(SignalKind::Answer, target_user_id, payload).await,
            ClientEvent::WebrtcIceCandidate {
                target_user_id,
                payload,
            } => {
                self.relay(SignalKind::IceCandidate, target_user_id, payload)
                    .await
            }
            ClientEvent::UpdateMicAccess {
                room_id,
                target_user_id,
                has_mic_access,
            } => state
                .calls
                .grant_mic_access(room_id, user, target_user_id, has_mic_access)
                .await
                .map(|_| ()),
            ClientEvent::UpdateMuteStatus { room_id, is_muted } => {
                state.calls.set_muted(room_id, user, is_muted).await
            }
        }
    }

    async fn relay(
        &self,
        kind: SignalKind,
        target: UserId,
        payload: serde_json::Value,
    ) -> Result<(), RoomError> {
        self.state
            .calls
            .relay_signal(self.connection_id, kind, target, payload)
            .await
            .map(|_| ())
    }

    async fn reply(&self, event: ServerEvent) {
        self.state
            .presence
            .send_to_connection(self.connection_id, event)
            .await;
    }

    /// Tear down presence for this connection.
    pub async fn close(self) {
        self.state.presence.on_disconnect(self.connection_id).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::SessionAuthenticator;
    use crate::presence::Connection;
    use crate::repositories::{InMemoryRoomStore, RoomStore};
    use serde_json::json;

    struct NoAuth;

    impl SessionAuthenticator for NoAuth {
        fn authenticate(&self, _token: &str) -> Result<UserId, RoomError> {
            Err(RoomError::InvalidToken("unused".to_string()))
        }
    }

    struct Fixture {
        state: Arc<AppState>,
        store: Arc<InMemoryRoomStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryRoomStore::new());
        let state = Arc::new(AppState::new(store.clone(), Arc::new(NoAuth), 32));
        Fixture { state, store }
    }

    async fn session(f: &Fixture, user: UserId) -> (RealtimeSession, Connection) {
        let connection = f.state.presence.register(user).await;
        (
            RealtimeSession::new(f.state.clone(), connection.id, user),
            connection,
        )
    }

    fn next_event(connection: &mut Connection) -> ServerEvent {
        connection.events.try_recv().unwrap()
    }

    #[tokio::test]
    async fn test_malformed_frame_yields_error_event() {
        let f = fixture();
        let (session, mut connection) = session(&f, UserId::new()).await;

        session.handle_frame("{not json").await;
        assert_eq!(
            next_event(&mut connection),
            ServerEvent::error(INVALID_FRAME_MESSAGE)
        );

        session.handle_frame(r#"{"event":"dance","data":{}}"#).await;
        assert_eq!(
            next_event(&mut connection),
            ServerEvent::error(INVALID_FRAME_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_join_and_send_over_session() {
        let f = fixture();
        let creator = UserId::new();
        let room = f.state.rooms.create_room(creator, None, None).await.unwrap();
        let (session, mut connection) = session(&f, creator).await;

        session
            .handle_frame(&json!({"event": "joinRoom", "data": {"roomId": room.id}}).to_string())
            .await;
        assert!(matches!(
            next_event(&mut connection),
            ServerEvent::JoinedRoom { .. }
        ));

        session
            .handle_frame(
                &json!({"event": "sendMessage", "data": {"roomId": room.id, "content": "hi"}})
                    .to_string(),
            )
            .await;
        let ServerEvent::ReceiveMessage { message } = next_event(&mut connection) else {
            unreachable!("expected receiveMessage");
        };
        assert_eq!(message.content, "hi");
        assert_eq!(f.store.messages_for_room(room.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_service_errors_become_error_events() {
        let f = fixture();
        let creator = UserId::new();
        let room = f.state.rooms.create_room(creator, None, None).await.unwrap();
        let (stranger, mut stranger_conn) = session(&f, UserId::new()).await;

        stranger
            .handle_frame(&json!({"event": "joinRoom", "data": {"roomId": room.id}}).to_string())
            .await;
        assert_eq!(
            next_event(&mut stranger_conn),
            ServerEvent::error("You are not a participant of this room")
        );

        // Lock with a single participant is an invalid state for the creator too
        let (creator_session, mut creator_conn) = session(&f, creator).await;
        creator_session
            .handle_frame(&json!({"event": "toggleLockRoom", "data": {"roomId": room.id}}).to_string())
            .await;
        assert_eq!(
            next_event(&mut creator_conn),
            ServerEvent::error("Cannot lock a room with fewer than 2 participants")
        );
    }

    #[tokio::test]
    async fn test_close_removes_connection() {
        let f = fixture();
        let (session, _connection) = session(&f, UserId::new()).await;
        assert_eq!(f.state.presence.connection_count().await, 1);

        session.close().await;
        assert_eq!(f.state.presence.connection_count().await, 0);
    }
}
