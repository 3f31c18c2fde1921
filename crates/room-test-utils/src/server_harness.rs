//! Test server harness for E2E testing
//!
//! Provides `TestRoomServer` for spawning real room service instances in
//! tests. The server runs on the in-memory store and verifies tokens signed
//! with [`TEST_JWT_SECRET`].

use crate::token_builders::TestTokenBuilder;
use common::types::UserId;
use metrics_exporter_prometheus::PrometheusBuilder;
use room_service::auth::JwtAuthenticator;
use room_service::repositories::InMemoryRoomStore;
use room_service::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Signing secret shared by the harness server and [`TestRoomServer::token_for`].
pub const TEST_JWT_SECRET: &[u8] = b"room-test-secret-at-least-32-bytes-long";

/// Outbound queue size for connections on the test server.
pub const TEST_CONNECTION_BUFFER: usize = 64;

/// Test harness for spawning the room service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<()> {
///     let server = TestRoomServer::spawn().await?;
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestRoomServer {
    addr: SocketAddr,
    store: Arc<InMemoryRoomStore>,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestRoomServer {
    /// Spawn a server on a random local port with an empty store.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        let store = Arc::new(InMemoryRoomStore::new());
        let authenticator = Arc::new(JwtAuthenticator::new(
            TEST_JWT_SECRET,
            Duration::from_secs(60),
        ));
        let state = Arc::new(AppState::new(
            store.clone(),
            authenticator,
            TEST_CONNECTION_BUFFER,
        ));

        // A detached recorder; tests never install a global one
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state.clone(), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            store,
            state,
            _handle: handle,
        })
    }

    /// The backing store, for seeding users and inspecting state.
    pub fn store(&self) -> &Arc<InMemoryRoomStore> {
        &self.store
    }

    /// Shared application state, for driving background work directly.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL carrying `token` as a query parameter.
    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/api/v1/ws?token={}", self.addr, token)
    }

    /// WebSocket URL without credentials.
    pub fn ws_url_anonymous(&self) -> String {
        format!("ws://{}/api/v1/ws", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// A valid session token for `user_id`.
    pub fn token_for(&self, user_id: UserId) -> String {
        TestTokenBuilder::new()
            .for_user(user_id)
            .sign(TEST_JWT_SECRET)
    }
}

impl Drop for TestRoomServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
