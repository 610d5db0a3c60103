//! Metrics collection and export for threadbox.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use threadbox_core::RouterStats;
use tracing::info;

/// Metric names.
pub mod names {
    pub const MESSAGES_TOTAL: &str = "threadbox_messages_total";
    pub const PAYLOAD_BYTES: &str = "threadbox_payload_bytes_total";
    pub const THREADS_ACTIVE: &str = "threadbox_threads_active";
    pub const UNREAD_MESSAGES: &str = "threadbox_unread_messages";
    pub const OPEN_VIEWS: &str = "threadbox_open_views";
    pub const OBSERVERS_ACTIVE: &str = "threadbox_observers_active";
    pub const ERRORS_TOTAL: &str = "threadbox_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of messages ingested");
    metrics::describe_counter!(names::PAYLOAD_BYTES, "Total bytes of payload ingested");
    metrics::describe_gauge!(names::THREADS_ACTIVE, "Current number of threads");
    metrics::describe_gauge!(names::UNREAD_MESSAGES, "Current number of unread messages");
    metrics::describe_gauge!(names::OPEN_VIEWS, "Current number of open views");
    metrics::describe_gauge!(
        names::OBSERVERS_ACTIVE,
        "Current number of connected notification observers"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record an ingested message.
pub fn record_message(bytes: usize, live: bool) {
    let delivery = if live { "live" } else { "unread" };
    counter!(names::MESSAGES_TOTAL, "delivery" => delivery).increment(1);
    counter!(names::PAYLOAD_BYTES).increment(bytes as u64);
}

/// Publish router gauges.
pub fn record_router(stats: &RouterStats) {
    gauge!(names::THREADS_ACTIVE).set(stats.thread_count as f64);
    gauge!(names::UNREAD_MESSAGES).set(stats.unread_count as f64);
    gauge!(names::OPEN_VIEWS).set(stats.open_views as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that tracks a connected observer until dropped.
pub struct ObserverMetricsGuard;

impl ObserverMetricsGuard {
    /// Create a new metrics guard, recording a connected observer.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::OBSERVERS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ObserverMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ObserverMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::OBSERVERS_ACTIVE).decrement(1.0);
    }
}
