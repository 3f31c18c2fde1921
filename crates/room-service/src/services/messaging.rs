//! Chat message persistence and fan-out.

use crate::errors::RoomError;
use crate::models::{Message, MAX_MESSAGE_LENGTH};
use crate::observability::metrics;
use crate::presence::{Audience, PresenceTracker, ServerEvent};
use crate::repositories::RoomStore;
use chrono::Utc;
use common::types::{MessageId, RoomId, UserId};
use std::sync::Arc;
use tracing::instrument;

pub struct MessageBroadcaster {
    store: Arc<dyn RoomStore>,
    presence: Arc<PresenceTracker>,
}

impl MessageBroadcaster {
    pub fn new(store: Arc<dyn RoomStore>, presence: Arc<PresenceTracker>) -> Self {
        Self { store, presence }
    }

    /// Persist a message from a room participant and broadcast it to every
    /// connection subscribed to the room, the sender's included.
    ///
    /// Persistence and broadcast run under the room's sequencer, so
    /// subscribers receive messages in the order they were stored.
    #[instrument(skip_all, name = "room.services.send_message", fields(room_id = %room_id))]
    pub async fn send(
        &self,
        room_id: RoomId,
        sender: UserId,
        content: &str,
    ) -> Result<Message, RoomError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(RoomError::BadRequest(
                "Message content cannot be empty".to_string(),
            ));
        }
        if content.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(RoomError::BadRequest(format!(
                "Message content exceeds {MAX_MESSAGE_LENGTH} characters"
            )));
        }

        let room = self
            .store
            .get_room(room_id)
            .await?
            .ok_or_else(|| RoomError::NotFound("Room not found".to_string()))?;
        if !room.is_participant(sender) {
            return Err(RoomError::Forbidden(
                "You are not a participant of this room".to_string(),
            ));
        }

        // A room deleted from here on fails the insert with NotFound.
        let sequencer = self.presence.sequencer(room_id).await;
        let _ordered = sequencer.lock().await;

        let message = Message {
            id: MessageId::new(),
            room_id,
            sender,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_message(&message).await?;

        let recipients = self
            .presence
            .broadcast(
                room_id,
                ServerEvent::ReceiveMessage {
                    message: message.clone(),
                },
                Audience::Everyone,
            )
            .await;

        metrics::record_message_sent(recipients);
        tracing::debug!(
            target: "room.services.messaging",
            room_id = %room_id,
            user_id = %sender,
            message_id = %message.id,
            recipients = recipients,
            "Message sent"
        );

        Ok(message)
    }
}
