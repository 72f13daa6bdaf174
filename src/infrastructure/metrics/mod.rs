//! Prometheus Metrics Module
//!
//! Application-wide metrics collection.
//!
//! # Metrics Collected
//! - Active gateway connection gauges
//! - Broadcast fan-out counters per scope kind
//! - Active call session gauges per state
//! - Database query duration histograms

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Active gateway connections gauge
pub static GATEWAY_CONNECTIONS_ACTIVE: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new(
            "gateway_connections_active",
            "Number of active gateway connections",
        )
        .namespace("signal_gateway"),
        &["state"], // "connected", "identified"
    )
    .expect("Failed to create GATEWAY_CONNECTIONS_ACTIVE metric")
});

/// Broadcast counter - payloads fanned out per scope kind
pub static BROADCASTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("broadcasts_total", "Total payloads broadcast to groups")
            .namespace("signal_gateway"),
        &["scope_kind"],
    )
    .expect("Failed to create BROADCASTS_TOTAL metric")
});

/// Active call sessions gauge
pub static CALL_SESSIONS_ACTIVE: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new("call_sessions_active", "Number of tracked call sessions")
            .namespace("signal_gateway"),
        &["direction"], // "incoming", "outgoing"
    )
    .expect("Failed to create CALL_SESSIONS_ACTIVE metric")
});

/// Database query duration histogram
pub static DB_QUERY_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];
    HistogramVec::new(
        HistogramOpts::new(
            "db_query_duration_seconds",
            "Database query latency in seconds",
        )
        .namespace("signal_gateway")
        .buckets(buckets),
        &["operation", "table"],
    )
    .expect("Failed to create DB_QUERY_DURATION_SECONDS metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(GATEWAY_CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register GATEWAY_CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(BROADCASTS_TOTAL.clone()))
        .expect("Failed to register BROADCASTS_TOTAL");
    registry
        .register(Box::new(CALL_SESSIONS_ACTIVE.clone()))
        .expect("Failed to register CALL_SESSIONS_ACTIVE");
    registry
        .register(Box::new(DB_QUERY_DURATION_SECONDS.clone()))
        .expect("Failed to register DB_QUERY_DURATION_SECONDS");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Metrics should be valid UTF-8")
}
