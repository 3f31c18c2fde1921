//! Liveness and readiness probes.

use crate::models::ReadinessResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Handler for GET /health
///
/// Does not check dependencies; failure means the process is hung.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Handler for GET /ready
///
/// Returns 503 when the room store is unreachable. The response carries a
/// generic message; the cause is logged.
#[tracing::instrument(skip_all, name = "room.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Err(e) = state.store.ping().await {
        tracing::warn!(target: "room.health", error = %e, "Readiness check failed: store unreachable");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not_ready",
                database: Some("unhealthy"),
                error: Some("Service dependencies unavailable".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(ReadinessResponse {
            status: "ready",
            database: Some("healthy"),
            error: None,
        }),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "OK");
    }

    #[tokio::test]
    async fn test_readiness_with_reachable_store() {
        use crate::auth::SessionAuthenticator;
        use crate::errors::RoomError;
        use crate::repositories::InMemoryRoomStore;
        use common::types::UserId;
        use http_body_util::BodyExt;

        struct NoAuth;

        impl SessionAuthenticator for NoAuth {
            fn authenticate(&self, _token: &str) -> Result<UserId, RoomError> {
                Err(RoomError::InvalidToken("unused".to_string()))
            }
        }

        let state = Arc::new(AppState::new(
            Arc::new(InMemoryRoomStore::new()),
            Arc::new(NoAuth),
            4,
        ));

        let response = readiness_check(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["database"], "healthy");
        assert!(json.get("error").is_none());
    }
}
