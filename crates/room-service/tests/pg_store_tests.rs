//! PostgreSQL room store tests.
//!
//! Each test gets a fresh database with the workspace migrations applied by
//! the sqlx test macro.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use chrono::{Duration, Utc};
use common::types::{MessageId, RoomId, UserId};
use room_service::errors::RoomError;
use room_service::models::{Message, Room, RoomStatus};
use room_service::repositories::{PgRoomStore, RoomStore};
use room_service::services::{JoinCoordinator, JoinTarget};
use sqlx::PgPool;
use std::sync::Arc;

fn room(code: &str, max: i32) -> Room {
    Room::new(UserId::new(), code.to_string(), max, None, Utc::now())
}

fn message(room_id: RoomId, sender: UserId, content: &str) -> Message {
    Message {
        id: MessageId::new(),
        room_id,
        sender,
        content: content.to_string(),
        created_at: Utc::now(),
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_and_read_back(pool: PgPool) -> Result<()> {
    let store = PgRoomStore::new(pool);
    let created = room("111111", 3);
    store.insert_room(&created).await?;

    let loaded = store.get_room(created.id).await?.unwrap();
    assert_eq!(loaded.id, created.id);
    assert_eq!(loaded.creator, created.creator);
    assert_eq!(loaded.participants, vec![created.creator]);
    assert_eq!(loaded.status, RoomStatus::Active);
    assert_eq!(loaded.max_participants, 3);
    assert_eq!(loaded.version, 0);
    assert!(!loaded.voice_call.is_active);

    let by_code = store.find_by_join_code("111111").await?.unwrap();
    assert_eq!(by_code.id, created.id);
    assert!(store.join_code_in_use("111111").await?);
    assert!(!store.join_code_in_use("222222").await?);
    assert!(store.get_room(RoomId::new()).await?.is_none());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_compare_and_swap_checks_version(pool: PgPool) -> Result<()> {
    let store = PgRoomStore::new(pool);
    let created = room("121212", 3);
    store.insert_room(&created).await?;

    let guest = UserId::new();
    let stored = store
        .compare_and_swap(0, &created.with_participant(guest))
        .await?
        .unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.participants, vec![created.creator, guest]);

    // A writer still holding version 0 loses without touching the row
    let mut stale = created.clone();
    stale.is_locked = true;
    assert!(store.compare_and_swap(0, &stale).await?.is_none());

    let current = store.get_room(created.id).await?.unwrap();
    assert_eq!(current.version, 1);
    assert!(!current.is_locked);
    assert_eq!(current.participants.len(), 2);

    assert!(store
        .compare_and_swap(0, &room("131313", 2))
        .await?
        .is_none());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_live_join_code_is_unique_until_archived(pool: PgPool) -> Result<()> {
    let store = PgRoomStore::new(pool);
    let first = room("343434", 2);
    store.insert_room(&first).await?;

    let result = store.insert_room(&room("343434", 2)).await;
    assert!(matches!(result, Err(RoomError::DuplicateJoinCode)));

    let mut archived = first.clone();
    archived.status = RoomStatus::Archived;
    store.compare_and_swap(0, &archived).await?.unwrap();
    assert!(!store.join_code_in_use("343434").await?);
    assert!(store.find_by_join_code("343434").await?.is_none());

    let second = room("343434", 2);
    store.insert_room(&second).await?;
    assert_eq!(
        store.find_by_join_code("343434").await?.unwrap().id,
        second.id
    );

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_messages_keep_insertion_order_and_cascade(pool: PgPool) -> Result<()> {
    let store = PgRoomStore::new(pool);
    let created = room("565656", 2);
    store.insert_room(&created).await?;

    // Identical timestamps still come back in insertion order
    let at = Utc::now();
    let mut ids = Vec::new();
    for i in 0..5 {
        let mut m = message(created.id, created.creator, &format!("m{i}"));
        m.created_at = at;
        store.insert_message(&m).await?;
        ids.push(m.id);
    }

    let stored: Vec<_> = store
        .messages_for_room(created.id)
        .await?
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(stored, ids);

    assert!(store.delete_room(created.id).await?);
    assert!(!store.delete_room(created.id).await?);
    assert!(store.messages_for_room(created.id).await?.is_empty());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_message_for_missing_room_is_not_found(pool: PgPool) -> Result<()> {
    let store = PgRoomStore::new(pool);

    let result = store
        .insert_message(&message(RoomId::new(), UserId::new(), "orphan"))
        .await;
    assert!(matches!(result, Err(RoomError::NotFound(_))));

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_list_expired_and_history(pool: PgPool) -> Result<()> {
    let store = PgRoomStore::new(pool);
    let now = Utc::now();
    let user = UserId::new();

    let expired = Room::new(user, "787878".to_string(), 2, Some(now - Duration::minutes(5)), now);
    let later = Room::new(user, "898989".to_string(), 2, Some(now + Duration::hours(1)), now);
    let forever = Room::new(user, "909090".to_string(), 2, None, now);
    for r in [&expired, &later, &forever] {
        store.insert_room(r).await?;
    }

    assert_eq!(store.list_expired(now).await?, vec![expired.id]);

    store
        .insert_message(&message(later.id, user, "first"))
        .await?;
    store
        .insert_message(&message(later.id, user, "latest"))
        .await?;

    let history = store.rooms_for_user(user).await?;
    assert_eq!(history.len(), 3);
    let entry = history.iter().find(|a| a.room.id == later.id).unwrap();
    assert_eq!(entry.last_message.as_ref().unwrap().content, "latest");
    assert!(history
        .iter()
        .filter(|a| a.room.id != later.id)
        .all(|a| a.last_message.is_none()));
    assert!(store.rooms_for_user(UserId::new()).await?.is_empty());

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_find_users_returns_known_profiles(pool: PgPool) -> Result<()> {
    let known = UserId::new();
    sqlx::query("INSERT INTO users (user_id, username, display_name) VALUES ($1, $2, $3)")
        .bind(known.as_uuid())
        .bind("river")
        .bind("River")
        .execute(&pool)
        .await?;

    let store = PgRoomStore::new(pool);
    let users = store.find_users(&[known, UserId::new()]).await?;
    assert_eq!(users.len(), 1);
    let user = users.first().unwrap();
    assert_eq!(user.id, known);
    assert_eq!(user.username.as_deref(), Some("river"));
    assert_eq!(user.display_name.as_deref(), Some("River"));

    store.ping().await?;

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_joins_respect_capacity(pool: PgPool) -> Result<()> {
    let store: Arc<dyn RoomStore> = Arc::new(PgRoomStore::new(pool));
    let created = room("676767", 3);
    store.insert_room(&created).await?;
    let joins = Arc::new(JoinCoordinator::new(store.clone()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let joins = joins.clone();
        handles.push(tokio::spawn(async move {
            joins
                .join(JoinTarget::Code("676767".to_string()), UserId::new())
                .await
        }));
    }

    let mut joined = 0;
    for handle in handles {
        match handle.await? {
            Ok(outcome) => {
                assert!(!outcome.already_member);
                joined += 1;
            }
            Err(e) => assert!(
                matches!(
                    e,
                    RoomError::ConcurrentJoinConflict | RoomError::RoomUnavailable(_)
                ),
                "unexpected error {e:?}"
            ),
        }
    }

    let stored = store.get_room(created.id).await?.unwrap();
    assert_eq!(joined, 2);
    assert_eq!(stored.participants.len(), 3);
    assert_eq!(stored.status, RoomStatus::Locked);

    Ok(())
}
