//! Room handlers.
//!
//! All routes here sit behind `require_auth`; the caller's identity comes
//! from the `AuthenticatedUser` extension.

use crate::errors::RoomError;
use crate::middleware::AuthenticatedUser;
use crate::models::{
    CallStateResponse, CreateRoomRequest, CreateRoomResponse, JoinRoomRequest, JoinRoomResponse,
    LockStateResponse, RoomDetailsResponse, RoomHistoryEntry,
};
use crate::routes::AppState;
use crate::services::JoinTarget;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::types::RoomId;
use std::sync::Arc;
use tracing::instrument;

/// Unwrap a JSON body, turning parse failures into 400 instead of 422.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, RoomError> {
    body.map(|Json(value)| value).map_err(|e| {
        tracing::debug!(target: "room.handlers.rooms", error = %e, "Rejected request body");
        RoomError::BadRequest(e.body_text())
    })
}

/// Handler for POST /api/v1/rooms
#[instrument(skip_all, name = "room.handlers.create_room")]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
    body: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateRoomResponse>), RoomError> {
    let request = json_body(body)?;

    let room = state
        .rooms
        .create_room(
            caller.user_id,
            request.max_participants,
            request.expires_in.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            join_code: room.join_code,
            room_id: room.id,
        }),
    ))
}

/// Handler for POST /api/v1/rooms/join
#[instrument(skip_all, name = "room.handlers.join_room")]
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
    body: Result<Json<JoinRoomRequest>, JsonRejection>,
) -> Result<Json<JoinRoomResponse>, RoomError> {
    let request = json_body(body)?;
    let code = request.join_code.trim().to_string();

    let outcome = state
        .joins
        .join(JoinTarget::Code(code), caller.user_id)
        .await?;

    let message = if outcome.already_member {
        "You are already a member of this room"
    } else {
        "Joined room successfully"
    };

    Ok(Json(JoinRoomResponse {
        room_id: outcome.room.id,
        already_member: outcome.already_member,
        message: message.to_string(),
    }))
}

/// Handler for GET /api/v1/rooms/:room_id
#[instrument(skip_all, name = "room.handlers.get_room")]
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RoomDetailsResponse>, RoomError> {
    Ok(Json(state.rooms.room_details(room_id, caller.user_id).await?))
}

/// Handler for DELETE /api/v1/rooms/:room_id
#[instrument(skip_all, name = "room.handlers.delete_room")]
pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(room_id): Path<RoomId>,
) -> Result<StatusCode, RoomError> {
    state.rooms.delete_room(room_id, caller.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for PUT /api/v1/rooms/:room_id/lock
#[instrument(skip_all, name = "room.handlers.toggle_lock")]
pub async fn toggle_lock(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<LockStateResponse>, RoomError> {
    let is_locked = state.locks.toggle_lock(room_id, caller.user_id).await?;
    Ok(Json(LockStateResponse { room_id, is_locked }))
}

/// Handler for POST /api/v1/rooms/:room_id/call/start
#[instrument(skip_all, name = "room.handlers.start_call")]
pub async fn start_call(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<CallStateResponse>, RoomError> {
    let voice_call = state.calls.start_call(room_id, caller.user_id).await?;
    Ok(Json(CallStateResponse {
        room_id,
        voice_call,
    }))
}

/// Handler for POST /api/v1/rooms/:room_id/call/end
#[instrument(skip_all, name = "room.handlers.end_call")]
pub async fn end_call(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(room_id): Path<RoomId>,
) -> Result<Json<CallStateResponse>, RoomError> {
    let voice_call = state.calls.end_call(room_id, caller.user_id).await?;
    Ok(Json(CallStateResponse {
        room_id,
        voice_call,
    }))
}

/// Handler for GET /api/v1/me/rooms
#[instrument(skip_all, name = "room.handlers.room_history")]
pub async fn room_history(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<RoomHistoryEntry>>, RoomError> {
    Ok(Json(state.rooms.history(caller.user_id).await?))
}
