//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Active WebSocket connection gauge
//! - Envelope counts by kind, dropped envelopes by reason
//! - Fan-out delivery outcomes
//! - Presence broadcasts
//! - Collaborator failures and query latency
//! - Dispatch latency histograms

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Active WebSocket connections gauge
pub static WEBSOCKET_CONNECTIONS_ACTIVE: Lazy<Gauge> = Lazy::new(|| {
    Gauge::with_opts(
        Opts::new(
            "websocket_connections_active",
            "Number of open WebSocket connections",
        )
        .namespace("convo"),
    )
    .expect("Failed to create WEBSOCKET_CONNECTIONS_ACTIVE metric")
});

/// Inbound envelopes by kind
pub static ENVELOPES_RECEIVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("envelopes_received_total", "Inbound envelopes by kind").namespace("convo"),
        &["kind"],
    )
    .expect("Failed to create ENVELOPES_RECEIVED_TOTAL metric")
});

/// Inbound frames that produced no effect, by reason
pub static ENVELOPES_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("envelopes_dropped_total", "Inbound frames dropped, by reason")
            .namespace("convo"),
        &["reason"],
    )
    .expect("Failed to create ENVELOPES_DROPPED_TOTAL metric")
});

/// Per-connection delivery outcomes during fan-out
pub static FANOUT_DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("fanout_deliveries_total", "Outbound deliveries to connections")
            .namespace("convo"),
        &["outcome"], // "delivered", "failed"
    )
    .expect("Failed to create FANOUT_DELIVERIES_TOTAL metric")
});

/// Presence broadcasts by status
pub static PRESENCE_BROADCASTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("presence_broadcasts_total", "Online/offline broadcasts").namespace("convo"),
        &["status"],
    )
    .expect("Failed to create PRESENCE_BROADCASTS_TOTAL metric")
});

/// Failed persistence/membership calls
pub static COLLABORATOR_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "collaborator_failures_total",
            "Failed persistence or membership calls",
        )
        .namespace("convo"),
        &["operation"],
    )
    .expect("Failed to create COLLABORATOR_FAILURES_TOTAL metric")
});

/// Envelope dispatch duration histogram
pub static DISPATCH_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];
    HistogramVec::new(
        HistogramOpts::new(
            "dispatch_duration_seconds",
            "Time from frame receipt to completed fan-out",
        )
        .namespace("convo")
        .buckets(buckets),
        &["kind"],
    )
    .expect("Failed to create DISPATCH_DURATION_SECONDS metric")
});

/// Database query duration histogram
pub static DB_QUERY_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];
    HistogramVec::new(
        HistogramOpts::new(
            "db_query_duration_seconds",
            "Database query latency in seconds",
        )
        .namespace("convo")
        .buckets(buckets),
        &["operation", "table"],
    )
    .expect("Failed to create DB_QUERY_DURATION_SECONDS metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(WEBSOCKET_CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register WEBSOCKET_CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(ENVELOPES_RECEIVED_TOTAL.clone()))
        .expect("Failed to register ENVELOPES_RECEIVED_TOTAL");
    registry
        .register(Box::new(ENVELOPES_DROPPED_TOTAL.clone()))
        .expect("Failed to register ENVELOPES_DROPPED_TOTAL");
    registry
        .register(Box::new(FANOUT_DELIVERIES_TOTAL.clone()))
        .expect("Failed to register FANOUT_DELIVERIES_TOTAL");
    registry
        .register(Box::new(PRESENCE_BROADCASTS_TOTAL.clone()))
        .expect("Failed to register PRESENCE_BROADCASTS_TOTAL");
    registry
        .register(Box::new(COLLABORATOR_FAILURES_TOTAL.clone()))
        .expect("Failed to register COLLABORATOR_FAILURES_TOTAL");
    registry
        .register(Box::new(DISPATCH_DURATION_SECONDS.clone()))
        .expect("Failed to register DISPATCH_DURATION_SECONDS");
    registry
        .register(Box::new(DB_QUERY_DURATION_SECONDS.clone()))
        .expect("Failed to register DB_QUERY_DURATION_SECONDS");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_envelope(kind: &str) {
    ENVELOPES_RECEIVED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_dropped(reason: &str) {
    ENVELOPES_DROPPED_TOTAL.with_label_values(&[reason]).inc();
}

/// Helper to record the result of one fan-out
pub fn record_fanout(delivered: usize, failed: usize) {
    FANOUT_DELIVERIES_TOTAL
        .with_label_values(&["delivered"])
        .inc_by(delivered as u64);
    FANOUT_DELIVERIES_TOTAL
        .with_label_values(&["failed"])
        .inc_by(failed as u64);
}

pub fn record_presence(status: &str) {
    PRESENCE_BROADCASTS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_collaborator_failure(operation: &str) {
    COLLABORATOR_FAILURES_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn record_dispatch(kind: &str, duration_secs: f64) {
    DISPATCH_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(duration_secs);
}

/// Helper to record database query metrics
pub fn record_db_query(operation: &str, table: &str, duration_secs: f64) {
    DB_QUERY_DURATION_SECONDS
        .with_label_values(&[operation, table])
        .observe(duration_secs);
}

/// Helper to update WebSocket connection count
pub fn set_websocket_connections(connected: usize) {
    WEBSOCKET_CONNECTIONS_ACTIVE.set(connected as f64);
}
