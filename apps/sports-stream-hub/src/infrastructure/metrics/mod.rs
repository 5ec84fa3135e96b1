//! Prometheus Metrics Module
//!
//! Exposes hub metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Connections**: live connection gauge, connect/disconnect counters
//! - **Subscriptions**: total subscription gauge
//! - **Messages**: outbound frames sent and dropped by type, inbound frames by outcome
//! - **Events**: events emitted by each source, upstream reconnects
//! - **Latency**: fan-out duration by delivery mode
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are cheap no-ops until [`init_metrics`] installs a recorder,
//! so library code and tests can call them freely.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and describe all metrics.
///
/// Calling it again returns the already installed handle.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Connections
    describe_gauge!(
        "sports_hub_connections",
        "Number of registered client connections"
    );
    describe_counter!(
        "sports_hub_connections_total",
        "Total client connections registered"
    );
    describe_counter!(
        "sports_hub_disconnections_total",
        "Total client connections removed"
    );

    // Subscriptions
    describe_gauge!(
        "sports_hub_subscriptions",
        "Sum of game, player and team subscriptions over all clients"
    );

    // Messages
    describe_counter!(
        "sports_hub_messages_sent_total",
        "Total frames queued to client connections"
    );
    describe_counter!(
        "sports_hub_messages_dropped_total",
        "Total frames dropped for closed or slow connections"
    );
    describe_counter!(
        "sports_hub_inbound_messages_total",
        "Total client frames by routing outcome"
    );

    // Event sources
    describe_counter!(
        "sports_hub_events_emitted_total",
        "Total events published by event sources"
    );
    describe_counter!(
        "sports_hub_feed_reconnects_total",
        "Total upstream feed reconnection attempts"
    );

    // Latency
    describe_histogram!(
        "sports_hub_broadcast_seconds",
        "Time to fan a frame out to its recipients"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for delivery modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMode {
    /// One client.
    Unicast,
    /// Every open connection.
    All,
    /// Subscribers of one identifier.
    Filtered,
}

impl BroadcastMode {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unicast => "unicast",
            Self::All => "all",
            Self::Filtered => "filtered",
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_gauge(count: usize) -> f64 {
    count as f64
}

fn as_counter(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}

/// Update the registered connection gauge.
pub fn set_connections(count: usize) {
    gauge!("sports_hub_connections").set(as_gauge(count));
}

/// Record a newly registered connection.
pub fn record_connection_opened() {
    counter!("sports_hub_connections_total").increment(1);
}

/// Record a removed connection.
pub fn record_connection_closed() {
    counter!("sports_hub_disconnections_total").increment(1);
}

/// Update the total subscription gauge.
pub fn set_subscriptions(count: usize) {
    gauge!("sports_hub_subscriptions").set(as_gauge(count));
}

/// Record frames queued to clients.
pub fn record_message_sent(message_type: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        "sports_hub_messages_sent_total",
        "message_type" => message_type
    )
    .increment(as_counter(count));
}

/// Record frames dropped for closed or slow connections.
pub fn record_messages_dropped(message_type: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        "sports_hub_messages_dropped_total",
        "message_type" => message_type
    )
    .increment(as_counter(count));
}

/// Record one routed client frame.
pub fn record_inbound(outcome: &'static str) {
    counter!(
        "sports_hub_inbound_messages_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Record one event published by a source.
pub fn record_event_emitted(source: &'static str, event_type: &'static str) {
    counter!(
        "sports_hub_events_emitted_total",
        "source" => source,
        "event_type" => event_type
    )
    .increment(1);
}

/// Record an upstream feed reconnection attempt.
pub fn record_feed_reconnect(source: &'static str) {
    counter!(
        "sports_hub_feed_reconnects_total",
        "source" => source
    )
    .increment(1);
}

/// Record fan-out duration.
pub fn record_broadcast_duration(mode: BroadcastMode, duration: Duration) {
    histogram!(
        "sports_hub_broadcast_seconds",
        "mode" => mode.as_str()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_mode_as_str() {
        assert_eq!(BroadcastMode::Unicast.as_str(), "unicast");
        assert_eq!(BroadcastMode::All.as_str(), "all");
        assert_eq!(BroadcastMode::Filtered.as_str(), "filtered");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        set_connections(3);
        record_message_sent("pong", 1);
        record_messages_dropped("game_update", 0);
        record_broadcast_duration(BroadcastMode::All, Duration::from_millis(2));
    }

    #[test]
    fn counter_conversion_saturates() {
        assert_eq!(as_counter(7), 7);
        assert!((as_gauge(5) - 5.0).abs() < f64::EPSILON);
    }
}
