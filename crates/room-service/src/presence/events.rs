//! Real-time channel events.
//!
//! Frames are JSON text of the shape `{"event": "<name>", "data": {...}}`
//! in both directions.

use crate::models::{Message, UserSummary, VoiceCallState};
use common::types::{RoomId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event sent by a client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "joinRoom", rename_all = "camelCase")]
    JoinRoom { room_id: RoomId },

    #[serde(rename = "sendMessage", rename_all = "camelCase")]
    SendMessage { room_id: RoomId, content: String },

    #[serde(rename = "toggleLockRoom", rename_all = "camelCase")]
    ToggleLockRoom { room_id: RoomId },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing { room_id: RoomId, is_typing: bool },

    #[serde(rename = "start-call", rename_all = "camelCase")]
    StartCall { room_id: RoomId },

    #[serde(rename = "end-call", rename_all = "camelCase")]
    EndCall { room_id: RoomId },

    #[serde(rename = "webrtc-offer", rename_all = "camelCase")]
    WebrtcOffer {
        target_user_id: UserId,
        payload: Value,
    },

    #[serde(rename = "webrtc-answer", rename_all = "camelCase")]
    WebrtcAnswer {
        target_user_id: UserId,
        payload: Value,
    },

    #[serde(rename = "webrtc-ice-candidate", rename_all = "camelCase")]
    WebrtcIceCandidate {
        target_user_id: UserId,
        payload: Value,
    },

    #[serde(rename = "update-mic-access", rename_all = "camelCase")]
    UpdateMicAccess {
        room_id: RoomId,
        target_user_id: UserId,
        has_mic_access: bool,
    },

    #[serde(rename = "update-mute-status", rename_all = "camelCase")]
    UpdateMuteStatus { room_id: RoomId, is_muted: bool },
}

impl ClientEvent {
    /// Wire name, used as a bounded metrics label.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "joinRoom",
            ClientEvent::SendMessage { .. } => "sendMessage",
            ClientEvent::ToggleLockRoom { .. } => "toggleLockRoom",
            ClientEvent::Typing { .. } => "typing",
            ClientEvent::StartCall { .. } => "start-call",
            ClientEvent::EndCall { .. } => "end-call",
            ClientEvent::WebrtcOffer { .. } => "webrtc-offer",
            ClientEvent::WebrtcAnswer { .. } => "webrtc-answer",
            ClientEvent::WebrtcIceCandidate { .. } => "webrtc-ice-candidate",
            ClientEvent::UpdateMicAccess { .. } => "update-mic-access",
            ClientEvent::UpdateMuteStatus { .. } => "update-mute-status",
        }
    }
}

/// Kind of WebRTC signaling message being relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    /// The event delivered to the addressed peer.
    pub fn into_event(self, sender_user_id: UserId, payload: Value) -> ServerEvent {
        match self {
            SignalKind::Offer => ServerEvent::WebrtcOffer {
                sender_user_id,
                payload,
            },
            SignalKind::Answer => ServerEvent::WebrtcAnswer {
                sender_user_id,
                payload,
            },
            SignalKind::IceCandidate => ServerEvent::WebrtcIceCandidate {
                sender_user_id,
                payload,
            },
        }
    }
}

/// Event sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Snapshot sent to a connection after it subscribes to a room.
    #[serde(rename = "joinedRoom", rename_all = "camelCase")]
    JoinedRoom {
        room_id: RoomId,
        messages: Vec<Message>,
        other_user: Option<UserSummary>,
        is_locked: bool,
        voice_call: VoiceCallState,
    },

    #[serde(rename = "userJoined", rename_all = "camelCase")]
    UserJoined { room_id: RoomId, user: UserSummary },

    #[serde(rename = "receiveMessage", rename_all = "camelCase")]
    ReceiveMessage { message: Message },

    #[serde(rename = "roomStateChanged", rename_all = "camelCase")]
    RoomStateChanged { room_id: RoomId, is_locked: bool },

    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing {
        room_id: RoomId,
        user_id: UserId,
        is_typing: bool,
    },

    #[serde(rename = "call-started", rename_all = "camelCase")]
    CallStarted {
        room_id: RoomId,
        voice_call: VoiceCallState,
    },

    #[serde(rename = "call-ended", rename_all = "camelCase")]
    CallEnded {
        room_id: RoomId,
        voice_call: VoiceCallState,
    },

    #[serde(rename = "webrtc-offer", rename_all = "camelCase")]
    WebrtcOffer {
        sender_user_id: UserId,
        payload: Value,
    },

    #[serde(rename = "webrtc-answer", rename_all = "camelCase")]
    WebrtcAnswer {
        sender_user_id: UserId,
        payload: Value,
    },

    #[serde(rename = "webrtc-ice-candidate", rename_all = "camelCase")]
    WebrtcIceCandidate {
        sender_user_id: UserId,
        payload: Value,
    },

    #[serde(rename = "mic-access-changed", rename_all = "camelCase")]
    MicAccessChanged {
        room_id: RoomId,
        user_id: UserId,
        has_mic_access: bool,
    },

    #[serde(rename = "mute-status-changed", rename_all = "camelCase")]
    MuteStatusChanged {
        room_id: RoomId,
        user_id: UserId,
        is_muted: bool,
    },

    #[serde(rename = "userLeft", rename_all = "camelCase")]
    UserLeft { room_id: RoomId, user_id: UserId },

    #[serde(rename = "user-left-room", rename_all = "camelCase")]
    UserLeftRoom { room_id: RoomId, user_id: UserId },

    /// The room was deleted while this connection was subscribed.
    #[serde(rename = "roomClosed", rename_all = "camelCase")]
    RoomClosed { room_id: RoomId },

    /// Non-fatal failure of a client event. The connection stays open.
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join_room() {
        let room_id = RoomId::new();
        let frame = json!({"event": "joinRoom", "data": {"roomId": room_id}}).to_string();
        let event: ClientEvent = serde_json::from_str(&frame).unwrap();

        assert!(matches!(event, ClientEvent::JoinRoom { room_id: r } if r == room_id));
        assert_eq!(event.name(), "joinRoom");
    }

    #[test]
    fn test_parse_hyphenated_events() {
        let room_id = RoomId::new();
        let target = UserId::new();

        let frame = json!({"event": "start-call", "data": {"roomId": room_id}});
        let event: ClientEvent = serde_json::from_value(frame).unwrap();
        assert!(matches!(event, ClientEvent::StartCall { .. }));

        let frame = json!({
            "event": "update-mic-access",
            "data": {"roomId": room_id, "targetUserId": target, "hasMicAccess": true}
        });
        let event: ClientEvent = serde_json::from_value(frame).unwrap();
        assert!(matches!(
            event,
            ClientEvent::UpdateMicAccess { has_mic_access: true, .. }
        ));

        let frame = json!({
            "event": "webrtc-ice-candidate",
            "data": {"targetUserId": target, "payload": {"candidate": "a=1", "sdpMLineIndex": 0}}
        });
        let event: ClientEvent = serde_json::from_value(frame).unwrap();
        let ClientEvent::WebrtcIceCandidate {
            target_user_id,
            payload,
        } = event
        else {
            unreachable!("expected webrtc-ice-candidate");
        };
        assert_eq!(target_user_id, target);
        assert_eq!(payload["candidate"], "a=1");
    }

    #[test]
    fn test_unknown_or_malformed_events_fail_to_parse() {
        for frame in [
            r#"{"event":"dance","data":{}}"#,
            r#"{"event":"joinRoom","data":{"roomId":"nope"}}"#,
            r#"{"event":"sendMessage","data":{"roomId":"6f9619ff-8b86-d011-b42d-00c04fc964ff"}}"#,
            r#"not json"#,
        ] {
            assert!(
                serde_json::from_str::<ClientEvent>(frame).is_err(),
                "frame {frame} should not parse"
            );
        }
    }

    #[test]
    fn test_server_event_wire_shape() {
        let room_id = RoomId::new();
        let user_id = UserId::new();

        let value = serde_json::to_value(ServerEvent::UserLeftRoom { room_id, user_id }).unwrap();
        assert_eq!(value["event"], "user-left-room");
        assert_eq!(value["data"]["userId"], user_id.to_string());
        assert_eq!(value["data"]["roomId"], room_id.to_string());

        let value = serde_json::to_value(ServerEvent::RoomStateChanged {
            room_id,
            is_locked: true,
        })
        .unwrap();
        assert_eq!(value["event"], "roomStateChanged");
        assert_eq!(value["data"]["isLocked"], true);

        let value = serde_json::to_value(ServerEvent::error("nope")).unwrap();
        assert_eq!(value, json!({"event": "error", "data": {"message": "nope"}}));
    }

    #[test]
    fn test_signal_kind_maps_to_event() {
        let sender = UserId::new();
        let event = SignalKind::Answer.into_event(sender, json!({"sdp": "v=0"}));
        let value = serde_json::to_value(event).unwrap();
        assert_eq!(value["event"], "webrtc-answer");
        assert_eq!(value["data"]["senderUserId"], sender.to_string());
        assert_eq!(value["data"]["payload"]["sdp"], "v=0");
    }
}
