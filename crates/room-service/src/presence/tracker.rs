//! Connection registry and room fan-out.
//!
//! The tracker owns every live real-time connection: who it belongs to, which
//! room (at most one) it is subscribed to, and the sending half of its bounded
//! outbound queue. Entries are created on connect and removed on disconnect.
//!
//! Delivery is fire-and-forget per connection. A full queue drops the event
//! for that connection only; a slow client never blocks the others.
//!
//! Each room also has a sequencer mutex. Message persistence and broadcast
//! happen under it, as does a join snapshot, so every subscriber observes
//! messages in persistence order and a joining connection sees each message
//! exactly once (in the snapshot or as a live event). The map holds weak
//! handles, so a sequencer lives only while some task holds it.

use crate::auth::SessionAuthenticator;
use crate::errors::RoomError;
use crate::observability::metrics;
use crate::presence::events::ServerEvent;
use crate::repositories::{resolve_users, RoomStore};
use common::types::{ConnectionId, RoomId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::instrument;

/// A registered connection as seen by its owner (the socket task).
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: UserId,
    /// Events addressed to this connection.
    pub events: mpsc::Receiver<ServerEvent>,
}

/// Which subscribers of a room receive a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    ExceptConnection(ConnectionId),
    ExceptUser(UserId),
    OnlyUser(UserId),
}

impl Audience {
    fn includes(self, connection_id: ConnectionId, user_id: UserId) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::ExceptConnection(id) => id != connection_id,
            Audience::ExceptUser(id) => id != user_id,
            Audience::OnlyUser(id) => id == user_id,
        }
    }
}

struct ConnectionEntry {
    user_id: UserId,
    room: Option<RoomId>,
    sender: mpsc::Sender<ServerEvent>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl Registry {
    /// Bind `connection_id` to `room_id`, replacing any previous binding.
    fn subscribe(&mut self, connection_id: ConnectionId, room_id: RoomId) -> Option<RoomId> {
        let previous = self.unsubscribe(connection_id);
        if let Some(entry) = self.connections.get_mut(&connection_id) {
            entry.room = Some(room_id);
            self.rooms.entry(room_id).or_default().insert(connection_id);
        }
        previous
    }

    fn unsubscribe(&mut self, connection_id: ConnectionId) -> Option<RoomId> {
        let room_id = self.connections.get_mut(&connection_id)?.room.take()?;
        if let Some(members) = self.rooms.get_mut(&room_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.rooms.remove(&room_id);
            }
        }
        Some(room_id)
    }

    fn user_present_in_room(&self, user_id: UserId, room_id: RoomId) -> bool {
        self.rooms.get(&room_id).is_some_and(|members| {
            members.iter().any(|id| {
                self.connections
                    .get(id)
                    .is_some_and(|entry| entry.user_id == user_id)
            })
        })
    }
}

/// Maps live connections to rooms and delivers room events.
pub struct PresenceTracker {
    authenticator: Arc<dyn SessionAuthenticator>,
    store: Arc<dyn RoomStore>,
    buffer_size: usize,
    registry: RwLock<Registry>,
    sequencers: Mutex<HashMap<RoomId, Weak<Mutex<()>>>>,
}

impl PresenceTracker {
    pub fn new(
        authenticator: Arc<dyn SessionAuthenticator>,
        store: Arc<dyn RoomStore>,
        buffer_size: usize,
    ) -> Self {
        Self {
            authenticator,
            store,
            buffer_size: buffer_size.max(1),
            registry: RwLock::new(Registry::default()),
            sequencers: Mutex::new(HashMap::new()),
        }
    }

    /// Authenticate a credential and register a connection for its user.
    pub async fn on_connect(&self, credential: &str) -> Result<Connection, RoomError> {
        let user_id = self.authenticator.authenticate(credential)?;
        Ok(self.register(user_id).await)
    }

    /// Register a connection for an already-authenticated user.
    pub async fn register(&self, user_id: UserId) -> Connection {
        let (sender, events) = mpsc::channel(self.buffer_size);
        let id = ConnectionId::new();

        let count = {
            let mut registry = self.registry.write().await;
            registry.connections.insert(
                id,
                ConnectionEntry {
                    user_id,
                    room: None,
                    sender,
                },
            );
            registry.connections.len()
        };
        metrics::set_active_connections(count);

        tracing::debug!(
            target: "room.presence",
            connection_id = %id,
            user_id = %user_id,
            "Connection registered"
        );

        Connection {
            id,
            user_id,
            events,
        }
    }

    /// Subscribe a connection to a room its user already belongs to.
    ///
    /// Replies on the same connection with a `joinedRoom` snapshot and tells
    /// the room's other subscribers that the user is present.
    #[instrument(skip_all, name = "room.presence.join", fields(connection_id = %connection_id, room_id = %room_id))]
    pub async fn on_join_room(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), RoomError> {
        let user_id = self
            .user_for(connection_id)
            .await
            .ok_or_else(|| RoomError::Internal("Unknown connection".to_string()))?;

        let sequencer = self.sequencer(room_id).await;
        let _ordered = sequencer.lock().await;

        // Read under the sequencer so a concurrent close_room either runs
        // first (the room is gone) or waits and unbinds this subscription.
        let room = self
            .store
            .get_room(room_id)
            .await?
            .ok_or_else(|| RoomError::NotFound("Room not found".to_string()))?;

        if !room.is_participant(user_id) {
            return Err(RoomError::Forbidden(
                "You are not a participant of this room".to_string(),
            ));
        }

        let mut profile_ids = vec![user_id];
        let other_id = room.other_participant(user_id);
        profile_ids.extend(other_id);
        let profiles = resolve_users(self.store.as_ref(), &profile_ids).await?;
        let mut profiles = profiles.into_iter();
        let joiner = profiles.next();
        let other_user = profiles.next();

        let messages = self.store.messages_for_room(room_id).await?;

        let previous = {
            let mut registry = self.registry.write().await;
            let previous = registry.subscribe(connection_id, room_id);
            if let Some(entry) = registry.connections.get(&connection_id) {
                deliver(
                    connection_id,
                    &entry.sender,
                    ServerEvent::JoinedRoom {
                        room_id,
                        messages,
                        other_user,
                        is_locked: room.is_locked,
                        voice_call: room.voice_call.clone(),
                    },
                );
            }
            previous
        };

        if let Some(previous) = previous.filter(|&p| p != room_id) {
            self.notify_departure(previous, user_id).await;
        }

        if previous != Some(room_id) {
            if let Some(user) = joiner {
                self.broadcast(
                    room_id,
                    ServerEvent::UserJoined { room_id, user },
                    Audience::ExceptConnection(connection_id),
                )
                .await;
            }
        }

        tracing::info!(
            target: "room.presence",
            connection_id = %connection_id,
            room_id = %room_id,
            user_id = %user_id,
            "Connection subscribed to room"
        );

        Ok(())
    }

    /// Remove a connection.
    ///
    /// If it was subscribed and its user has no other connection in the
    /// room, the remaining subscribers are told the user left. Room
    /// membership is untouched.
    pub async fn on_disconnect(&self, connection_id: ConnectionId) {
        let (removed, count) = {
            let mut registry = self.registry.write().await;
            let room = registry.unsubscribe(connection_id);
            let entry = registry.connections.remove(&connection_id);
            (entry.map(|e| (e.user_id, room)), registry.connections.len())
        };
        metrics::set_active_connections(count);

        let Some((user_id, room)) = removed else {
            return;
        };

        tracing::debug!(
            target: "room.presence",
            connection_id = %connection_id,
            user_id = %user_id,
            "Connection removed"
        );

        if let Some(room_id) = room {
            self.notify_departure(room_id, user_id).await;
        }
    }

    async fn notify_departure(&self, room_id: RoomId, user_id: UserId) {
        let still_present = self
            .registry
            .read()
            .await
            .user_present_in_room(user_id, room_id);
        if still_present {
            return;
        }

        self.broadcast(
            room_id,
            ServerEvent::UserLeft { room_id, user_id },
            Audience::Everyone,
        )
        .await;
        self.broadcast(
            room_id,
            ServerEvent::UserLeftRoom { room_id, user_id },
            Audience::Everyone,
        )
        .await;
    }

    /// Deliver an event to the room's subscribers. Returns how many
    /// connections accepted it.
    pub async fn broadcast(&self, room_id: RoomId, event: ServerEvent, audience: Audience) -> usize {
        let registry = self.registry.read().await;
        let Some(members) = registry.rooms.get(&room_id) else {
            return 0;
        };

        members
            .iter()
            .filter_map(|id| registry.connections.get(id).map(|entry| (*id, entry)))
            .filter(|(id, entry)| audience.includes(*id, entry.user_id))
            .filter(|(id, entry)| deliver(*id, &entry.sender, event.clone()))
            .count()
    }

    /// Deliver an event to a single connection.
    pub async fn send_to_connection(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let registry = self.registry.read().await;
        registry
            .connections
            .get(&connection_id)
            .is_some_and(|entry| deliver(connection_id, &entry.sender, event))
    }

    /// Relay a typing indicator to the other subscribers of the connection's room.
    pub async fn relay_typing(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
        is_typing: bool,
    ) -> Result<usize, RoomError> {
        let (user_id, bound) = self
            .binding(connection_id)
            .await
            .ok_or_else(|| RoomError::Internal("Unknown connection".to_string()))?;

        if bound != Some(room_id) {
            return Err(RoomError::Forbidden(
                "Join the room before sending typing updates".to_string(),
            ));
        }

        Ok(self
            .broadcast(
                room_id,
                ServerEvent::Typing {
                    room_id,
                    user_id,
                    is_typing,
                },
                Audience::ExceptConnection(connection_id),
            )
            .await)
    }

    /// Tell every subscriber the room is gone and drop their subscriptions.
    ///
    /// Waits for any in-flight join snapshot or message under the room's
    /// sequencer before unbinding.
    pub async fn close_room(&self, room_id: RoomId) -> usize {
        let sequencer = self.sequencer(room_id).await;
        let _ordered = sequencer.lock().await;

        let notified = {
            let mut registry = self.registry.write().await;
            let members = registry.rooms.remove(&room_id).unwrap_or_default();
            let mut notified = 0;
            for id in members {
                if let Some(entry) = registry.connections.get_mut(&id) {
                    entry.room = None;
                    if deliver(id, &entry.sender, ServerEvent::RoomClosed { room_id }) {
                        notified += 1;
                    }
                }
            }
            notified
        };

        tracing::debug!(
            target: "room.presence",
            room_id = %room_id,
            notified = notified,
            "Room closed for live connections"
        );

        notified
    }

    /// The per-room mutex that orders message persistence and broadcast.
    ///
    /// Callers share one mutex per room for as long as any of them holds it.
    /// Entries nobody holds are pruned here.
    pub async fn sequencer(&self, room_id: RoomId) -> Arc<Mutex<()>> {
        let mut sequencers = self.sequencers.lock().await;
        sequencers.retain(|_, handle| handle.strong_count() > 0);
        if let Some(existing) = sequencers.get(&room_id).and_then(Weak::upgrade) {
            return existing;
        }

        let sequencer = Arc::new(Mutex::new(()));
        sequencers.insert(room_id, Arc::downgrade(&sequencer));
        sequencer
    }

    /// Rooms with a sequencer currently held by some task.
    pub async fn sequencer_count(&self) -> usize {
        self.sequencers
            .lock()
            .await
            .values()
            .filter(|handle| handle.strong_count() > 0)
            .count()
    }

    pub async fn user_for(&self, connection_id: ConnectionId) -> Option<UserId> {
        self.binding(connection_id).await.map(|(user, _)| user)
    }

    /// The room a connection is subscribed to.
    pub async fn bound_room(&self, connection_id: ConnectionId) -> Option<RoomId> {
        self.binding(connection_id).await.and_then(|(_, room)| room)
    }

    async fn binding(&self, connection_id: ConnectionId) -> Option<(UserId, Option<RoomId>)> {
        self.registry
            .read()
            .await
            .connections
            .get(&connection_id)
            .map(|entry| (entry.user_id, entry.room))
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.connections.len()
    }
}

/// Non-blocking send. Returns whether the event was queued.
fn deliver(connection_id: ConnectionId, sender: &mpsc::Sender<ServerEvent>, event: ServerEvent) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            metrics::record_dropped_event();
            tracing::warn!(
                target: "room.presence",
                connection_id = %connection_id,
                "Outbound queue full, dropping event"
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!(
                target: "room.presence",
                connection_id = %connection_id,
                "Connection closed, dropping event"
            );
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::{Message, Room};
    use crate::repositories::InMemoryRoomStore;
    use chrono::Utc;
    use common::types::MessageId;

    struct StaticAuthenticator(UserId);

    impl SessionAuthenticator for StaticAuthenticator {
        fn authenticate(&self, token: &str) -> Result<UserId, RoomError> {
            if token == "good" {
                Ok(self.0)
            } else {
                Err(RoomError::InvalidToken("bad".to_string()))
            }
        }
    }

    struct Fixture {
        store: Arc<InMemoryRoomStore>,
        presence: PresenceTracker,
        room: Room,
        guest: UserId,
    }

    async fn fixture(buffer: usize) -> Fixture {
        let store = Arc::new(InMemoryRoomStore::new());
        let room = Room::new(UserId::new(), "246810".to_string(), 3, None, Utc::now());
        let guest = UserId::new();
        let room = room.with_participant(guest);
        store.insert_room(&room).await.unwrap();

        let presence = PresenceTracker::new(
            Arc::new(StaticAuthenticator(room.creator)),
            store.clone(),
            buffer,
        );
        Fixture {
            store,
            presence,
            room,
            guest,
        }
    }

    fn drain(connection: &mut Connection) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = connection.events.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_on_connect_authenticates() {
        let f = fixture(8).await;
        let connection = f.presence.on_connect("good").await.unwrap();
        assert_eq!(connection.user_id, f.room.creator);
        assert_eq!(f.presence.connection_count().await, 1);

        assert!(f.presence.on_connect("bad").await.is_err());
        assert_eq!(f.presence.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_join_room_sends_snapshot_and_notifies_other() {
        let f = fixture(8).await;
        f.store
            .insert_message(&Message {
                id: MessageId::new(),
                room_id: f.room.id,
                sender: f.room.creator,
                content: "earlier".to_string(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let mut host = f.presence.register(f.room.creator).await;
        let mut guest = f.presence.register(f.guest).await;

        f.presence.on_join_room(host.id, f.room.id).await.unwrap();
        let events = drain(&mut host);
        assert_eq!(events.len(), 1);
        let Some(ServerEvent::JoinedRoom {
            messages,
            other_user,
            is_locked,
            ..
        }) = events.into_iter().next()
        else {
            unreachable!("expected snapshot");
        };
        assert_eq!(messages.len(), 1);
        assert_eq!(other_user.unwrap().id, f.guest);
        assert!(!is_locked);

        f.presence.on_join_room(guest.id, f.room.id).await.unwrap();
        assert!(matches!(
            drain(&mut guest).first(),
            Some(ServerEvent::JoinedRoom { .. })
        ));
        let host_events = drain(&mut host);
        assert!(matches!(
            host_events.first(),
            Some(ServerEvent::UserJoined { user, .. }) if user.id == f.guest
        ));
    }

    #[tokio::test]
    async fn test_join_room_rejects_non_participant() {
        let f = fixture(8).await;
        let mut stranger = f.presence.register(UserId::new()).await;

        let result = f.presence.on_join_room(stranger.id, f.room.id).await;
        assert!(matches!(result, Err(RoomError::Forbidden(_))));
        assert!(drain(&mut stranger).is_empty());
        assert_eq!(f.presence.bound_room(stranger.id).await, None);
    }

    #[tokio::test]
    async fn test_join_unknown_room() {
        let f = fixture(8).await;
        let host = f.presence.register(f.room.creator).await;

        let result = f.presence.on_join_room(host.id, RoomId::new()).await;
        assert!(matches!(result, Err(RoomError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_disconnect_notifies_room_without_touching_membership() {
        let f = fixture(8).await;
        let mut host = f.presence.register(f.room.creator).await;
        let guest = f.presence.register(f.guest).await;
        f.presence.on_join_room(host.id, f.room.id).await.unwrap();
        f.presence.on_join_room(guest.id, f.room.id).await.unwrap();
        drain(&mut host);

        f.presence.on_disconnect(guest.id).await;

        let events = drain(&mut host);
        assert_eq!(
            events,
            vec![
                ServerEvent::UserLeft {
                    room_id: f.room.id,
                    user_id: f.guest
                },
                ServerEvent::UserLeftRoom {
                    room_id: f.room.id,
                    user_id: f.guest
                },
            ]
        );

        let room = f.store.get_room(f.room.id).await.unwrap().unwrap();
        assert!(room.is_participant(f.guest));
        assert_eq!(f.presence.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_of_second_tab_is_silent() {
        let f = fixture(8).await;
        let mut host = f.presence.register(f.room.creator).await;
        let guest_a = f.presence.register(f.guest).await;
        let guest_b = f.presence.register(f.guest).await;
        for id in [host.id, guest_a.id, guest_b.id] {
            f.presence.on_join_room(id, f.room.id).await.unwrap();
        }
        drain(&mut host);

        f.presence.on_disconnect(guest_a.id).await;
        assert!(drain(&mut host).is_empty());

        f.presence.on_disconnect(guest_b.id).await;
        assert_eq!(drain(&mut host).len(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_audiences() {
        let f = fixture(8).await;
        let mut host = f.presence.register(f.room.creator).await;
        let mut guest = f.presence.register(f.guest).await;
        f.presence.on_join_room(host.id, f.room.id).await.unwrap();
        f.presence.on_join_room(guest.id, f.room.id).await.unwrap();
        drain(&mut host);
        drain(&mut guest);

        let event = ServerEvent::error("x");
        assert_eq!(
            f.presence
                .broadcast(f.room.id, event.clone(), Audience::Everyone)
                .await,
            2
        );
        assert_eq!(
            f.presence
                .broadcast(f.room.id, event.clone(), Audience::ExceptConnection(host.id))
                .await,
            1
        );
        assert_eq!(
            f.presence
                .broadcast(f.room.id, event.clone(), Audience::ExceptUser(f.guest))
                .await,
            1
        );
        assert_eq!(
            f.presence
                .broadcast(f.room.id, event.clone(), Audience::OnlyUser(f.guest))
                .await,
            1
        );
        assert_eq!(drain(&mut host).len(), 2);
        assert_eq!(drain(&mut guest).len(), 3);
    }

    #[tokio::test]
    async fn test_full_queue_drops_only_for_slow_connection() {
        let f = fixture(1).await;
        let mut host = f.presence.register(f.room.creator).await;
        let slow = f.presence.register(f.guest).await;
        f.presence.on_join_room(slow.id, f.room.id).await.unwrap();
        f.presence.on_join_room(host.id, f.room.id).await.unwrap();
        // slow's single slot now holds its snapshot; host's holds its own
        drain(&mut host);

        let delivered = f
            .presence
            .broadcast(f.room.id, ServerEvent::error("tick"), Audience::Everyone)
            .await;
        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut host), vec![ServerEvent::error("tick")]);
    }

    #[tokio::test]
    async fn test_typing_requires_subscription() {
        let f = fixture(8).await;
        let host = f.presence.register(f.room.creator).await;
        let mut guest = f.presence.register(f.guest).await;

        assert!(f
            .presence
            .relay_typing(host.id, f.room.id, true)
            .await
            .is_err());

        f.presence.on_join_room(host.id, f.room.id).await.unwrap();
        f.presence.on_join_room(guest.id, f.room.id).await.unwrap();
        drain(&mut guest);

        assert_eq!(
            f.presence
                .relay_typing(host.id, f.room.id, true)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            drain(&mut guest),
            vec![ServerEvent::Typing {
                room_id: f.room.id,
                user_id: f.room.creator,
                is_typing: true
            }]
        );
    }

    #[tokio::test]
    async fn test_close_room_notifies_and_unsubscribes() {
        let f = fixture(8).await;
        let mut host = f.presence.register(f.room.creator).await;
        f.presence.on_join_room(host.id, f.room.id).await.unwrap();
        drain(&mut host);

        assert_eq!(f.presence.close_room(f.room.id).await, 1);
        assert_eq!(
            drain(&mut host),
            vec![ServerEvent::RoomClosed { room_id: f.room.id }]
        );
        assert_eq!(f.presence.bound_room(host.id).await, None);
        assert_eq!(
            f.presence
                .broadcast(f.room.id, ServerEvent::error("late"), Audience::Everyone)
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_join_after_close_is_not_found() {
        let f = fixture(8).await;
        let mut host = f.presence.register(f.room.creator).await;
        f.presence.on_join_room(host.id, f.room.id).await.unwrap();
        drain(&mut host);

        f.store.delete_room(f.room.id).await.unwrap();
        f.presence.close_room(f.room.id).await;

        let result = f.presence.on_join_room(host.id, f.room.id).await;
        assert!(matches!(result, Err(RoomError::NotFound(_))));
        assert_eq!(f.presence.bound_room(host.id).await, None);
        assert_eq!(f.presence.sequencer_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_room_waits_for_held_sequencer() {
        let f = Arc::new(fixture(8).await);
        let mut host = f.presence.register(f.room.creator).await;
        f.presence.on_join_room(host.id, f.room.id).await.unwrap();
        drain(&mut host);

        let sequencer = f.presence.sequencer(f.room.id).await;
        let held = sequencer.lock().await;

        let closing = {
            let f = f.clone();
            tokio::spawn(async move { f.presence.close_room(f.room.id).await })
        };
        tokio::task::yield_now().await;
        assert_eq!(f.presence.bound_room(host.id).await, Some(f.room.id));

        drop(held);
        assert_eq!(closing.await.unwrap(), 1);
        assert_eq!(f.presence.bound_room(host.id).await, None);
    }

    #[tokio::test]
    async fn test_sequencers_released_when_unheld() {
        let f = fixture(8).await;
        let first = f.presence.sequencer(f.room.id).await;
        let second = f.presence.sequencer(f.room.id).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(f.presence.sequencer_count().await, 1);

        drop(first);
        drop(second);
        assert_eq!(f.presence.sequencer_count().await, 0);

        for _ in 0..50 {
            let result = f
                .presence
                .on_join_room(f.presence.register(f.guest).await.id, RoomId::new())
                .await;
            assert!(matches!(result, Err(RoomError::NotFound(_))));
        }
        assert_eq!(f.presence.sequencer_count().await, 0);
        assert!(f.presence.sequencers.lock().await.len() <= 1);
    }

    #[tokio::test]
    async fn test_switching_rooms_leaves_previous() {
        let f = fixture(8).await;
        let other = Room::new(f.room.creator, "135791".to_string(), 2, None, Utc::now());
        f.store.insert_room(&other).await.unwrap();

        let host = f.presence.register(f.room.creator).await;
        let mut guest = f.presence.register(f.guest).await;
        f.presence.on_join_room(guest.id, f.room.id).await.unwrap();
        f.presence.on_join_room(host.id, f.room.id).await.unwrap();
        drain(&mut guest);

        f.presence.on_join_room(host.id, other.id).await.unwrap();
        assert_eq!(f.presence.bound_room(host.id).await, Some(other.id));

        let events = drain(&mut guest);
        assert!(events.contains(&ServerEvent::UserLeft {
            room_id: f.room.id,
            user_id: f.room.creator
        }));
    }
}
