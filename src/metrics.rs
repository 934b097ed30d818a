//! Prometheus metrics for refresh cycles and the streaming connection.
//!
//! This module provides metrics for:
//! - Refresh cycle outcomes
//! - Per-source fetch latency and failures
//! - Merged book size
//! - Streaming messages and reconnections

use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// Refresh cycles completed counter metric name.
pub const METRIC_REFRESH_CYCLES: &str = "refresh_cycles_total";
/// Refresh cycles failed counter metric name.
pub const METRIC_REFRESH_FAILURES: &str = "refresh_failures_total";
/// Source fetch latency metric name.
pub const METRIC_SOURCE_FETCH_LATENCY: &str = "source_fetch_latency_ms";
/// Source fetch failures counter metric name.
pub const METRIC_SOURCE_FETCH_FAILURES: &str = "source_fetch_failures_total";
/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// Merged entries gauge metric name.
pub const METRIC_MERGED_ENTRIES: &str = "merged_book_entries";
/// Streaming messages received counter metric name.
pub const METRIC_WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// Streaming reconnect attempts counter metric name.
pub const METRIC_WS_RECONNECTS: &str = "ws_reconnects_total";
/// Streaming reconnect exhaustion counter metric name.
pub const METRIC_WS_RECONNECT_EXHAUSTED: &str = "ws_reconnect_exhausted_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_counter!(METRIC_REFRESH_CYCLES, "Total number of completed refresh cycles");
    describe_counter!(METRIC_REFRESH_FAILURES, "Total number of failed refresh cycles");
    describe_histogram!(
        METRIC_SOURCE_FETCH_LATENCY,
        "Exchange source fetch latency in milliseconds"
    );
    describe_counter!(
        METRIC_SOURCE_FETCH_FAILURES,
        "Total number of failed exchange source fetches"
    );
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "HTTP request latency in milliseconds"
    );
    describe_gauge!(METRIC_MERGED_ENTRIES, "Entries in the merged book per side");
    describe_counter!(
        METRIC_WS_MESSAGES_RECEIVED,
        "Total number of streaming messages received"
    );
    describe_counter!(METRIC_WS_RECONNECTS, "Total number of reconnection attempts");
    describe_counter!(
        METRIC_WS_RECONNECT_EXHAUSTED,
        "Total number of times reconnection gave up"
    );

    debug!("Metrics initialized");
}

/// Install the Prometheus recorder and return its render handle.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

/// Increment refresh cycles counter.
pub fn inc_refresh_cycles() {
    counter!(METRIC_REFRESH_CYCLES).increment(1);
}

/// Increment refresh failures counter.
pub fn inc_refresh_failures() {
    counter!(METRIC_REFRESH_FAILURES).increment(1);
}

/// Increment failures for one source.
pub fn inc_source_fetch_failures(source: &str) {
    counter!(METRIC_SOURCE_FETCH_FAILURES, "source" => source.to_string()).increment(1);
}

/// Record HTTP request latency.
pub fn record_http_latency(start: Instant, endpoint: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_HTTP_REQUEST_LATENCY, "endpoint" => endpoint.to_string()).record(latency_ms);
}

/// Record merged book size.
pub fn record_merged_entries(bids: usize, asks: usize) {
    gauge!(METRIC_MERGED_ENTRIES, "side" => "bid").set(bids as f64);
    gauge!(METRIC_MERGED_ENTRIES, "side" => "ask").set(asks as f64);
}

/// Increment streaming messages received counter.
pub fn inc_ws_messages_received() {
    counter!(METRIC_WS_MESSAGES_RECEIVED).increment(1);
}

/// Increment streaming reconnects counter.
pub fn inc_ws_reconnects() {
    counter!(METRIC_WS_RECONNECTS).increment(1);
}

/// Increment streaming reconnect exhaustion counter.
pub fn inc_ws_reconnect_exhausted() {
    counter!(METRIC_WS_RECONNECT_EXHAUSTED).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
    label: Option<(&'static str, String)>,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
            label: None,
        }
    }

    /// Attach one label to the recorded sample.
    pub fn with_label(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.label = Some((key, value.into()));
        self
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.elapsed_ms();
        match self.label.take() {
            Some((key, value)) => histogram!(self.metric_name, key => value).record(latency_ms),
            None => histogram!(self.metric_name).record(latency_ms),
        }
    }
}

/// Create a latency timer for one source fetch.
pub fn timer_source_fetch(source: &str) -> LatencyTimer {
    LatencyTimer::new(METRIC_SOURCE_FETCH_LATENCY).with_label("source", source)
}
