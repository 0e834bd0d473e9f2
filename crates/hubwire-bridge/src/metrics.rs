//! Metrics collection and export for the bridge.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use hubwire_transport::{ConnectionState, HubConnection};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const MESSAGES_TOTAL: &str = "hubwire_messages_total";
    pub const MALFORMED_TOTAL: &str = "hubwire_malformed_messages_total";
    pub const SEND_DROPPED_TOTAL: &str = "hubwire_send_dropped_total";
    pub const RECONNECTS_TOTAL: &str = "hubwire_reconnects_total";
    pub const CONNECTION_STATE: &str = "hubwire_connection_state";
    pub const SUBSCRIPTIONS_ACTIVE: &str = "hubwire_subscriptions_active";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::MESSAGES_TOTAL,
        "Messages exchanged with the hub, by direction"
    );
    metrics::describe_counter!(
        names::MALFORMED_TOTAL,
        "Inbound messages discarded as malformed"
    );
    metrics::describe_counter!(
        names::SEND_DROPPED_TOTAL,
        "Outbound commands dropped because the hub was not connected"
    );
    metrics::describe_counter!(names::RECONNECTS_TOTAL, "Reconnects scheduled");
    metrics::describe_gauge!(
        names::CONNECTION_STATE,
        "Connection state (0 disconnected, 1 connecting, 2 connected, 3 reconnecting)"
    );
    metrics::describe_gauge!(
        names::SUBSCRIPTIONS_ACTIVE,
        "Event handlers registered on the router"
    );

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

/// Record a message in `direction` ("inbound" or "outbound").
pub fn record_message(direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
}

/// Record a discarded inbound message.
pub fn record_malformed() {
    counter!(names::MALFORMED_TOTAL).increment(1);
}

/// Record a command dropped while disconnected.
pub fn record_send_dropped() {
    counter!(names::SEND_DROPPED_TOTAL).increment(1);
}

/// Update the registered handler count.
pub fn set_subscriptions(count: usize) {
    gauge!(names::SUBSCRIPTIONS_ACTIVE).set(count as f64);
}

/// Record a connection state transition.
pub fn record_state(state: ConnectionState) {
    let value = match state {
        ConnectionState::Disconnected => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Connected => 2.0,
        ConnectionState::Reconnecting => 3.0,
    };
    gauge!(names::CONNECTION_STATE).set(value);

    if state == ConnectionState::Reconnecting {
        counter!(names::RECONNECTS_TOTAL).increment(1);
    }
}

/// Follow the connection state until the connection is dropped.
pub fn track_connection(connection: &HubConnection) -> tokio::task::JoinHandle<()> {
    let mut states = connection.watch_state();
    tokio::spawn(async move {
        record_state(*states.borrow_and_update());
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            record_state(state);
        }
    })
}
