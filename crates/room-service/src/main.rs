//! Room Service
//!
//! Entry point for Roomkey: serves the room API and the real-time channel,
//! and sweeps expired rooms in the background.
//!
//! # Startup
//!
//! 1. Initialize tracing
//! 2. Load configuration from the environment
//! 3. Install the Prometheus metrics recorder
//! 4. Connect to PostgreSQL and run migrations
//! 5. Spawn the expiry sweeper
//! 6. Serve HTTP until SIGINT/SIGTERM, then drain and stop the sweeper

use anyhow::Context;
use room_service::auth::JwtAuthenticator;
use room_service::config::Config;
use room_service::observability::metrics::init_metrics_recorder;
use room_service::repositories::PgRoomStore;
use room_service::routes::{self, AppState};
use room_service::tasks::start_expiry_sweeper;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Room Service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        jwt_clock_skew_seconds = config.jwt_clock_skew_seconds,
        sweep_interval_seconds = config.sweep_interval_seconds,
        connection_buffer_size = config.connection_buffer_size,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        anyhow::anyhow!(e)
    })?;

    info!("Connecting to database...");
    let db_url_with_timeout = add_query_timeout(&config.database_url, 5);
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;

    info!("Database connection established");

    let store = Arc::new(PgRoomStore::new(db_pool));
    let authenticator = Arc::new(JwtAuthenticator::new(
        config.jwt_secret_bytes(),
        config.jwt_clock_skew(),
    ));
    let state = Arc::new(AppState::new(
        store,
        authenticator,
        config.connection_buffer_size,
    ));

    let sweeper_token = CancellationToken::new();
    let sweeper = tokio::spawn(start_expiry_sweeper(
        state.store.clone(),
        state.presence.clone(),
        config.sweep_interval(),
        sweeper_token.child_token(),
    ));

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address: {}", config.bind_address))?;

    // Bind before announcing so bind errors fail fast
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Room Service listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(config.drain_seconds))
    .await?;

    sweeper_token.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Expiry sweeper task ended abnormally");
    }

    info!("Room Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a signal is received and the drain period is complete.
async fn shutdown_signal(drain_secs: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (ROOM_DRAIN_SECONDS=0)");
    }
}

/// Appends a statement_timeout to the database URL.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}options=-c%20statement_timeout%3D{timeout_secs}s")
}
