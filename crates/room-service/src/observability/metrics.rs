//! Metrics definitions for the room service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `room_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: parameterized paths, unknown paths collapse to `/other`
//! - `operation`: fixed by code (insert_room, compare_and_swap, ...)
//! - `outcome` / `status`: fixed by code
//! - `event`: real-time event names

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Histogram buckets per metric prefix, in seconds.
const HISTOGRAM_BUCKETS: &[(&str, &[f64])] = &[
    (
        "room_http_request",
        &[0.005, 0.01, 0.025, 0.05, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0, 2.0],
    ),
    (
        "room_db_query",
        &[0.001, 0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.25, 0.5, 1.0],
    ),
    ("room_sweep", &[0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]),
];

/// Install the global Prometheus recorder and return its render handle.
///
/// Call once, before anything records a metric.
///
/// # Errors
///
/// Fails if a bucket list is rejected or a recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    let mut builder = PrometheusBuilder::new();
    for (prefix, buckets) in HISTOGRAM_BUCKETS {
        builder = builder
            .set_buckets_for_metric(Matcher::Prefix((*prefix).to_string()), buckets)
            .map_err(|e| format!("Invalid buckets for {prefix}: {e}"))?;
    }

    builder
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `room_http_requests_total`, `room_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// Captures framework-level rejections (415, 405, JSON errors) as well.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("room_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("room_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        100..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/ready" | "/metrics" | "/api/v1/rooms" | "/api/v1/rooms/join"
        | "/api/v1/me/rooms" | "/api/v1/ws" => path.to_string(),
        _ => normalize_dynamic_endpoint(path),
    }
}

/// Replaces room ids with a placeholder.
fn normalize_dynamic_endpoint(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("/api/v1/rooms/") {
        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            [_] => return "/api/v1/rooms/{room_id}".to_string(),
            [_, "lock"] => return "/api/v1/rooms/{room_id}/lock".to_string(),
            [_, "call", "start"] => return "/api/v1/rooms/{room_id}/call/start".to_string(),
            [_, "call", "end"] => return "/api/v1/rooms/{room_id}/call/end".to_string(),
            _ => {}
        }
    }

    "/other".to_string()
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record database query execution
///
/// Metric: `room_db_query_duration_seconds`, `room_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("room_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("room_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Room Lifecycle Metrics
// ============================================================================

/// Metric: `room_created_total`
pub fn record_room_created(code_attempts: u32) {
    counter!("room_created_total").increment(1);
    histogram!("room_join_code_attempts").record(f64::from(code_attempts));
}

/// Record a join attempt.
///
/// Metric: `room_joins_total`
/// Labels: `outcome` (joined, already_member, not_found, unavailable, conflict, error)
pub fn record_join(outcome: &str) {
    counter!("room_joins_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a lost compare-and-swap.
///
/// Metric: `room_cas_conflicts_total`
/// Labels: `operation`
pub fn record_cas_conflict(operation: &str) {
    counter!("room_cas_conflicts_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Metric: `room_messages_sent_total`, `room_message_fanout`
pub fn record_message_sent(recipients: usize) {
    counter!("room_messages_sent_total").increment(1);
    histogram!("room_message_fanout").record(recipients as f64);
}

// ============================================================================
// Real-time Metrics
// ============================================================================

/// Record a handled inbound real-time event.
///
/// Metric: `room_realtime_events_total`
/// Labels: `event`, `status` (success, error)
pub fn record_realtime_event(event: &str, status: &str) {
    counter!("room_realtime_events_total",
        "event" => event.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record an outbound event dropped because a connection queue was full.
///
/// Metric: `room_realtime_dropped_events_total`
pub fn record_dropped_event() {
    counter!("room_realtime_dropped_events_total").increment(1);
}

/// Set the number of live real-time connections.
///
/// Metric: `room_active_connections`
pub fn set_active_connections(count: usize) {
    gauge!("room_active_connections").set(count as f64);
}

// ============================================================================
// Expiry Sweeper Metrics
// ============================================================================

/// Record one sweep run.
///
/// Metric: `room_sweeps_total`, `room_sweep_duration_seconds`,
/// `room_swept_rooms_total`
/// Labels: `status` on runs, `outcome` on rooms (deleted, already_gone, failed)
pub fn record_sweep(
    status: &str,
    deleted: usize,
    already_gone: usize,
    failed: usize,
    duration: Duration,
) {
    histogram!("room_sweep_duration_seconds").record(duration.as_secs_f64());

    counter!("room_sweeps_total",
        "status" => status.to_string()
    )
    .increment(1);

    for (outcome, count) in [
        ("deleted", deleted),
        ("already_gone", already_gone),
        ("failed", failed),
    ] {
        if count > 0 {
            counter!("room_swept_rooms_total",
                "outcome" => outcome
            )
            .increment(count as u64);
        }
    }
}
