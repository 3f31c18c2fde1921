//! PostgreSQL room store.
//!
//! # Concurrency
//!
//! - Room mutations are a single `UPDATE ... WHERE room_id = $1 AND version = $2`,
//!   so a concurrent writer that read the same version loses cleanly
//! - Join code uniqueness among non-archived rooms is enforced by the
//!   `rooms_join_code_live` partial unique index
//! - Message rows reference rooms with `ON DELETE CASCADE`
//!
//! All queries use parameterized statements.

use crate::errors::RoomError;
use crate::models::{
    Message, Room, RoomActivity, RoomStatus, UserSummary, VoiceCallState,
};
use crate::observability::metrics;
use crate::repositories::RoomStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{MessageId, RoomId, UserId};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

const ROOM_COLUMNS: &str = r#"
    r.room_id, r.join_code, r.creator_id, r.participants, r.status, r.is_locked,
    r.max_participants, r.expires_at, r.voice_call, r.version, r.created_at, r.updated_at
"#;

/// Room store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgRoomStore {
    pool: PgPool,
}

impl PgRoomStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Record query metrics and convert the error.
fn observe<T>(
    operation: &str,
    start: Instant,
    result: Result<T, sqlx::Error>,
) -> Result<T, RoomError> {
    let duration = start.elapsed();
    match result {
        Ok(value) => {
            metrics::record_db_query(operation, "success", duration);
            Ok(value)
        }
        Err(e) => {
            metrics::record_db_query(operation, "error", duration);
            Err(RoomError::from(e))
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// Map a database row to a Room.
fn map_row_to_room(row: &PgRow) -> Result<Room, RoomError> {
    let status: String = row.try_get("status")?;
    let status = RoomStatus::parse(&status)
        .ok_or_else(|| RoomError::Database(format!("Unknown room status '{status}'")))?;
    let participants: Vec<Uuid> = row.try_get("participants")?;
    let Json(voice_call): Json<VoiceCallState> = row.try_get("voice_call")?;

    Ok(Room {
        id: RoomId(row.try_get("room_id")?),
        join_code: row.try_get("join_code")?,
        creator: UserId(row.try_get("creator_id")?),
        participants: participants.into_iter().map(UserId).collect(),
        status,
        is_locked: row.try_get("is_locked")?,
        max_participants: row.try_get("max_participants")?,
        expires_at: row.try_get("expires_at")?,
        voice_call,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_row_to_message(row: &PgRow) -> Result<Message, RoomError> {
    Ok(Message {
        id: MessageId(row.try_get("message_id")?),
        room_id: RoomId(row.try_get("room_id")?),
        sender: UserId(row.try_get("sender_id")?),
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

fn participant_uuids(room: &Room) -> Vec<Uuid> {
    room.participants.iter().map(UserId::as_uuid).collect()
}

#[async_trait]
impl RoomStore for PgRoomStore {
    #[instrument(skip_all, name = "room.repo.insert_room", fields(room_id = %room.id))]
    async fn insert_room(&self, room: &Room) -> Result<(), RoomError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            INSERT INTO rooms (
                room_id, join_code, creator_id, participants, status, is_locked,
                max_participants, expires_at, voice_call, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(room.id.as_uuid()) // $1
        .bind(&room.join_code) // $2
        .bind(room.creator.as_uuid()) // $3
        .bind(participant_uuids(room)) // $4
        .bind(room.status.as_str()) // $5
        .bind(room.is_locked) // $6
        .bind(room.max_participants) // $7
        .bind(room.expires_at) // $8
        .bind(Json(&room.voice_call)) // $9
        .bind(room.version) // $10
        .bind(room.created_at) // $11
        .bind(room.updated_at) // $12
        .execute(&self.pool)
        .await;

        match result {
            Err(e) if is_unique_violation(&e) => {
                metrics::record_db_query("insert_room", "conflict", start.elapsed());
                Err(RoomError::DuplicateJoinCode)
            }
            other => observe("insert_room", start, other).map(|_| ()),
        }
    }

    #[instrument(skip_all, name = "room.repo.join_code_in_use")]
    async fn join_code_in_use(&self, join_code: &str) -> Result<bool, RoomError> {
        let start = Instant::now();

        let result = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM rooms WHERE join_code = $1 AND status <> 'archived'
            )
            "#,
        )
        .bind(join_code)
        .fetch_one(&self.pool)
        .await;

        observe("join_code_in_use", start, result)
    }

    #[instrument(skip_all, name = "room.repo.get_room", fields(room_id = %room_id))]
    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>, RoomError> {
        let start = Instant::now();

        let result = sqlx::query(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.room_id = $1"
        ))
        .bind(room_id.as_uuid())
        .fetch_optional(&self.pool)
        .await;

        observe("get_room", start, result)?
            .as_ref()
            .map(map_row_to_room)
            .transpose()
    }

    #[instrument(skip_all, name = "room.repo.find_by_join_code")]
    async fn find_by_join_code(&self, join_code: &str) -> Result<Option<Room>, RoomError> {
        let start = Instant::now();

        let result = sqlx::query(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.join_code = $1 AND r.status <> 'archived'"
        ))
        .bind(join_code)
        .fetch_optional(&self.pool)
        .await;

        observe("find_by_join_code", start, result)?
            .as_ref()
            .map(map_row_to_room)
            .transpose()
    }

    #[instrument(
        skip_all,
        name = "room.repo.compare_and_swap",
        fields(room_id = %room.id, expected_version = expected_version)
    )]
    async fn compare_and_swap(
        &self,
        expected_version: i64,
        room: &Room,
    ) -> Result<Option<Room>, RoomError> {
        let start = Instant::now();

        let result = sqlx::query(&format!(
            r#"
            UPDATE rooms r SET
                participants = $3,
                status = $4,
                is_locked = $5,
                max_participants = $6,
                expires_at = $7,
                voice_call = $8,
                version = r.version + 1,
                updated_at = NOW()
            WHERE r.room_id = $1 AND r.version = $2
            RETURNING {ROOM_COLUMNS}
            "#
        ))
        .bind(room.id.as_uuid()) // $1
        .bind(expected_version) // $2
        .bind(participant_uuids(room)) // $3
        .bind(room.status.as_str()) // $4
        .bind(room.is_locked) // $5
        .bind(room.max_participants) // $6
        .bind(room.expires_at) // $7
        .bind(Json(&room.voice_call)) // $8
        .fetch_optional(&self.pool)
        .await;

        observe("compare_and_swap", start, result)?
            .as_ref()
            .map(map_row_to_room)
            .transpose()
    }

    #[instrument(skip_all, name = "room.repo.delete_room", fields(room_id = %room_id))]
    async fn delete_room(&self, room_id: RoomId) -> Result<bool, RoomError> {
        let start = Instant::now();

        // messages cascade via FK
        let result = sqlx::query("DELETE FROM rooms WHERE room_id = $1")
            .bind(room_id.as_uuid())
            .execute(&self.pool)
            .await;

        Ok(observe("delete_room", start, result)?.rows_affected() > 0)
    }

    #[instrument(skip_all, name = "room.repo.list_expired")]
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<RoomId>, RoomError> {
        let start = Instant::now();

        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT room_id FROM rooms
            WHERE expires_at IS NOT NULL AND expires_at <= $1
            ORDER BY expires_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await;

        Ok(observe("list_expired", start, result)?
            .into_iter()
            .map(RoomId)
            .collect())
    }

    #[instrument(skip_all, name = "room.repo.rooms_for_user")]
    async fn rooms_for_user(&self, user_id: UserId) -> Result<Vec<RoomActivity>, RoomError> {
        let start = Instant::now();

        let result = sqlx::query(&format!(
            r#"
            SELECT {ROOM_COLUMNS},
                m.message_id AS last_message_id,
                m.sender_id AS last_sender_id,
                m.content AS last_content,
                m.created_at AS last_created_at
            FROM rooms r
            LEFT JOIN LATERAL (
                SELECT message_id, sender_id, content, created_at
                FROM messages
                WHERE room_id = r.room_id
                ORDER BY seq DESC
                LIMIT 1
            ) m ON true
            WHERE $1 = ANY(r.participants)
            "#
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await;

        observe("rooms_for_user", start, result)?
            .iter()
            .map(|row| {
                let room = map_row_to_room(row)?;
                let last_id: Option<Uuid> = row.try_get("last_message_id")?;
                let last_message = match last_id {
                    Some(id) => Some(Message {
                        id: MessageId(id),
                        room_id: room.id,
                        sender: UserId(row.try_get("last_sender_id")?),
                        content: row.try_get("last_content")?,
                        created_at: row.try_get("last_created_at")?,
                    }),
                    None => None,
                };
                Ok(RoomActivity { room, last_message })
            })
            .collect()
    }

    #[instrument(skip_all, name = "room.repo.insert_message", fields(room_id = %message.room_id))]
    async fn insert_message(&self, message: &Message) -> Result<(), RoomError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            INSERT INTO messages (message_id, room_id, sender_id, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(message.id.as_uuid())
        .bind(message.room_id.as_uuid())
        .bind(message.sender.as_uuid())
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Err(e) if is_foreign_key_violation(&e) => {
                metrics::record_db_query("insert_message", "not_found", start.elapsed());
                Err(RoomError::NotFound("Room not found".to_string()))
            }
            other => observe("insert_message", start, other).map(|_| ()),
        }
    }

    #[instrument(skip_all, name = "room.repo.messages_for_room", fields(room_id = %room_id))]
    async fn messages_for_room(&self, room_id: RoomId) -> Result<Vec<Message>, RoomError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            SELECT message_id, room_id, sender_id, content, created_at
            FROM messages
            WHERE room_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(room_id.as_uuid())
        .fetch_all(&self.pool)
        .await;

        observe("messages_for_room", start, result)?
            .iter()
            .map(map_row_to_message)
            .collect()
    }

    #[instrument(skip_all, name = "room.repo.find_users")]
    async fn find_users(&self, user_ids: &[UserId]) -> Result<Vec<UserSummary>, RoomError> {
        let start = Instant::now();
        let ids: Vec<Uuid> = user_ids.iter().map(UserId::as_uuid).collect();

        let result = sqlx::query(
            r#"
            SELECT user_id, username, display_name
            FROM users
            WHERE user_id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await;

        observe("find_users", start, result)?
            .iter()
            .map(|row| {
                Ok(UserSummary {
                    id: UserId(row.try_get("user_id")?),
                    username: row.try_get("username")?,
                    display_name: row.try_get("display_name")?,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<(), RoomError> {
        let start = Instant::now();
        let result = sqlx::query("SELECT 1").execute(&self.pool).await;
        observe("ping", start, result).map(|_| ())
    }
}
