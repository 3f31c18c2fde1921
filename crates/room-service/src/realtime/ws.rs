//! WebSocket endpoint for the real-time channel.
//!
//! The session token is checked before the upgrade, so an unauthenticated
//! client gets a plain 401 and never a socket. After the upgrade one task
//! writes queued server events to the socket while the connection loop
//! reads client frames and hands them to the session in arrival order.

use crate::errors::RoomError;
use crate::presence::Connection;
use crate::realtime::RealtimeSession;
use crate::routes::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(default)]
    pub token: Option<String>,
}

/// Token from `?token=` or, failing that, the `Authorization` header.
fn credential(params: &ConnectParams, headers: &HeaderMap) -> Result<String, RoomError> {
    if let Some(token) = params.token.as_deref().filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
        .ok_or_else(|| {
            tracing::debug!(target: "room.realtime", "Missing session token on upgrade");
            RoomError::InvalidToken("Missing session token".to_string())
        })
}

/// Handler for GET /api/v1/ws
#[tracing::instrument(skip_all, name = "room.realtime.upgrade")]
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, RoomError> {
    let token = credential(&params, &headers)?;
    let connection = state.presence.on_connect(&token).await?;

    let connection_id = connection.id;
    let cleanup = state.clone();

    Ok(ws
        .on_failed_upgrade(move |e| {
            tracing::warn!(target: "room.realtime", connection_id = %connection_id, error = %e, "WebSocket upgrade failed");
            tokio::spawn(async move {
                cleanup.presence.on_disconnect(connection_id).await;
            });
        })
        .on_upgrade(move |socket| serve_connection(socket, state, connection)))
}

async fn serve_connection(socket: WebSocket, state: Arc<AppState>, connection: Connection) {
    let Connection {
        id: connection_id,
        user_id,
        mut events,
    } = connection;

    tracing::info!(
        target: "room.realtime",
        connection_id = %connection_id,
        user_id = %user_id,
        "Real-time connection opened"
    );

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(target: "room.realtime", error = %e, "Failed to serialize server event");
                    continue;
                }
            };
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let session = RealtimeSession::new(state, connection_id, user_id);

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => session.handle_frame(&text).await,
            Ok(Message::Binary(_)) => session.reject_frame().await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                tracing::debug!(target: "room.realtime", connection_id = %connection_id, error = %e, "WebSocket read failed");
                break;
            }
        }
    }

    session.close().await;
    writer.abort();

    tracing::info!(
        target: "room.realtime",
        connection_id = %connection_id,
        user_id = %user_id,
        "Real-time connection closed"
    );
}
