//! Expiry sweeper background task.
//!
//! Each run lists rooms whose `expires_at` has passed and deletes them one
//! at a time. The store cascades the delete to messages. A room that is
//! already gone counts as swept, and a failure on one room never stops the
//! rest of the run.
//!
//! The sweeper holds no lock across the scan. Explicit deletion and a second
//! sweeper may race it on the same room.

use crate::errors::RoomError;
use crate::observability::metrics;
use crate::presence::PresenceTracker;
use crate::repositories::RoomStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Outcome of one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub found: usize,
    pub deleted: usize,
    pub already_gone: usize,
    pub failed: usize,
}

/// Delete every room expired at `now` and close it for live connections.
///
/// Only the initial listing can fail the whole run; per-room errors are
/// logged and counted in [`SweepReport::failed`].
#[instrument(skip_all, name = "room.task.expiry_sweep")]
pub async fn sweep_expired_rooms(
    store: &dyn RoomStore,
    presence: &PresenceTracker,
    now: DateTime<Utc>,
) -> Result<SweepReport, RoomError> {
    let start = Instant::now();

    let expired = match store.list_expired(now).await {
        Ok(expired) => expired,
        Err(e) => {
            metrics::record_sweep("error", 0, 0, 0, start.elapsed());
            return Err(e);
        }
    };

    let mut report = SweepReport {
        found: expired.len(),
        ..SweepReport::default()
    };

    for room_id in expired {
        match store.delete_room(room_id).await {
            Ok(true) => {
                report.deleted += 1;
                presence.close_room(room_id).await;
            }
            Ok(false) => {
                report.already_gone += 1;
                tracing::debug!(
                    target: "room.task.expiry_sweeper",
                    room_id = %room_id,
                    "Expired room already deleted"
                );
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(
                    target: "room.task.expiry_sweeper",
                    room_id = %room_id,
                    error = %e,
                    "Failed to delete expired room"
                );
            }
        }
    }

    let status = if report.failed == 0 { "success" } else { "partial" };
    metrics::record_sweep(
        status,
        report.deleted,
        report.already_gone,
        report.failed,
        start.elapsed(),
    );

    Ok(report)
}

/// Run the expiry sweeper until `cancel_token` fires.
///
/// The first tick completes immediately, so a sweep runs at startup.
#[instrument(skip_all, name = "room.task.expiry_sweeper")]
pub async fn start_expiry_sweeper(
    store: Arc<dyn RoomStore>,
    presence: Arc<PresenceTracker>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "room.task.expiry_sweeper",
        interval_seconds = interval.as_secs(),
        "Starting expiry sweeper task"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweep_expired_rooms(store.as_ref(), &presence, Utc::now()).await {
                    Ok(report) if report.found > 0 => {
                        info!(
                            target: "room.task.expiry_sweeper",
                            found = report.found,
                            deleted = report.deleted,
                            already_gone = report.already_gone,
                            failed = report.failed,
                            "Expiry sweep completed"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            target: "room.task.expiry_sweeper",
                            error = %e,
                            "Expiry sweep could not list rooms"
                        );
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!(
                    target: "room.task.expiry_sweeper",
                    "Expiry sweeper received shutdown signal, exiting"
                );
                break;
            }
        }
    }
}
