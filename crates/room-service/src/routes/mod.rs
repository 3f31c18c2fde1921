//! HTTP routes for the room service.
//!
//! Defines the Axum router and application state.

use crate::auth::SessionAuthenticator;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use crate::presence::PresenceTracker;
use crate::realtime;
use crate::repositories::RoomStore;
use crate::services::{
    JoinCodeSource, JoinCoordinator, LockController, MessageBroadcaster, RandomJoinCodes,
    RoomRegistry, VoiceCallCoordinator,
};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers and real-time sessions.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RoomStore>,
    pub authenticator: Arc<dyn SessionAuthenticator>,
    pub presence: Arc<PresenceTracker>,
    pub rooms: Arc<RoomRegistry>,
    pub joins: Arc<JoinCoordinator>,
    pub locks: Arc<LockController>,
    pub calls: Arc<VoiceCallCoordinator>,
    pub messages: Arc<MessageBroadcaster>,
}

impl AppState {
    /// Wire every service over one store and authenticator.
    ///
    /// `connection_buffer_size` bounds each real-time connection's outbound
    /// queue.
    pub fn new(
        store: Arc<dyn RoomStore>,
        authenticator: Arc<dyn SessionAuthenticator>,
        connection_buffer_size: usize,
    ) -> Self {
        Self::with_code_source(
            store,
            authenticator,
            connection_buffer_size,
            Arc::new(RandomJoinCodes::new()),
        )
    }

    pub fn with_code_source(
        store: Arc<dyn RoomStore>,
        authenticator: Arc<dyn SessionAuthenticator>,
        connection_buffer_size: usize,
        codes: Arc<dyn JoinCodeSource>,
    ) -> Self {
        let presence = Arc::new(PresenceTracker::new(
            authenticator.clone(),
            store.clone(),
            connection_buffer_size,
        ));

        Self {
            rooms: Arc::new(RoomRegistry::with_code_source(
                store.clone(),
                presence.clone(),
                codes,
            )),
            joins: Arc::new(JoinCoordinator::new(store.clone())),
            locks: Arc::new(LockController::new(store.clone(), presence.clone())),
            calls: Arc::new(VoiceCallCoordinator::new(store.clone(), presence.clone())),
            messages: Arc::new(MessageBroadcaster::new(store.clone(), presence.clone())),
            presence,
            authenticator,
            store,
        }
    }
}

/// Build the application routes.
///
/// - `/health`, `/ready` - probes, public
/// - `/metrics` - Prometheus scrape, public
/// - `/api/v1/ws` - real-time channel; authenticates the upgrade itself
/// - `/api/v1/rooms/...`, `/api/v1/me/rooms` - require a session token
///
/// Layers: 30 second timeout, request tracing, and HTTP metrics outermost.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        authenticator: state.authenticator.clone(),
    });

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route("/api/v1/rooms", post(handlers::create_room))
        .route("/api/v1/rooms/join", post(handlers::join_room))
        .route(
            "/api/v1/rooms/:room_id",
            get(handlers::get_room).delete(handlers::delete_room),
        )
        .route("/api/v1/rooms/:room_id/lock", put(handlers::toggle_lock))
        .route(
            "/api/v1/rooms/:room_id/call/start",
            post(handlers::start_call),
        )
        .route("/api/v1/rooms/:room_id/call/end", post(handlers::end_call))
        .route("/api/v1/me/rooms", get(handlers::room_history))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state.clone());

    // Upgrades are long-lived, so the socket route stays outside the timeout
    let realtime_routes = Router::new()
        .route("/api/v1/ws", get(realtime::ws_handler))
        .with_state(state);

    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .merge(realtime_routes)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}
