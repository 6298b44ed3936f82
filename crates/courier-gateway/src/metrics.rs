//! Metrics collection and export for the gateway.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "courier_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "courier_connections_active";
    pub const HANDSHAKE_FAILURES_TOTAL: &str = "courier_handshake_failures_total";
    pub const EVENTS_TOTAL: &str = "courier_events_total";
    pub const EVENTS_BYTES: &str = "courier_events_bytes";
    pub const ROOMS_ACTIVE: &str = "courier_rooms_active";
    pub const MESSAGES_RELAYED_TOTAL: &str = "courier_messages_relayed_total";
    pub const RECEIPTS_RELAYED_TOTAL: &str = "courier_receipts_relayed_total";
    pub const TYPING_RELAYED_TOTAL: &str = "courier_typing_relayed_total";
    pub const NOTIFICATIONS_RELAYED_TOTAL: &str = "courier_notifications_relayed_total";
    pub const LATENCY_SECONDS: &str = "courier_event_latency_seconds";
    pub const ERRORS_TOTAL: &str = "courier_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since gateway start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::HANDSHAKE_FAILURES_TOTAL,
        "Connections refused during the authentication handshake"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Total number of events processed");
    metrics::describe_counter!(names::EVENTS_BYTES, "Total bytes of events processed");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of live rooms");
    metrics::describe_counter!(
        names::MESSAGES_RELAYED_TOTAL,
        "Chat messages relayed after persistence"
    );
    metrics::describe_counter!(
        names::RECEIPTS_RELAYED_TOTAL,
        "Read receipts relayed to senders"
    );
    metrics::describe_counter!(
        names::TYPING_RELAYED_TOTAL,
        "Typing signals relayed, including synthesized stops"
    );
    metrics::describe_counter!(
        names::NOTIFICATIONS_RELAYED_TOTAL,
        "Notifications fanned out to personal rooms"
    );
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Inbound event processing latency in seconds"
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

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a refused handshake.
pub fn record_handshake_failure() {
    counter!(names::HANDSHAKE_FAILURES_TOTAL).increment(1);
}

/// Record an event crossing the socket.
pub fn record_event(bytes: usize, direction: &str) {
    counter!(names::EVENTS_TOTAL, "direction" => direction.to_string()).increment(1);
    counter!(names::EVENTS_BYTES, "direction" => direction.to_string()).increment(bytes as u64);
}

/// Record a relayed chat message.
pub fn record_message_relayed() {
    counter!(names::MESSAGES_RELAYED_TOTAL).increment(1);
}

/// Record a relayed read receipt.
pub fn record_receipt_relayed() {
    counter!(names::RECEIPTS_RELAYED_TOTAL).increment(1);
}

/// Record a relayed typing signal.
pub fn record_typing_relayed() {
    counter!(names::TYPING_RELAYED_TOTAL).increment(1);
}

/// Record a fanned-out notification.
pub fn record_notification_relayed() {
    counter!(names::NOTIFICATIONS_RELAYED_TOTAL).increment(1);
}

/// Record inbound event processing latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Update the live room count.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
