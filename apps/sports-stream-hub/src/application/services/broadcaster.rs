//! Broadcaster
//!
//! Delivers outbound messages to one client, to every client, or to the
//! clients whose subscriptions match an event.
//!
//! # Design
//!
//! - Each message is encoded to JSON once and the resulting frame is shared
//!   by every recipient.
//! - Fan-out runs under the hub's read lock; transports only enqueue
//!   (non-blocking), so a slow client never stalls the others.
//! - Delivery is best-effort and at-most-once per connection. Frames that
//!   cannot be queued are dropped and counted, never retried.

use std::sync::Arc;
use std::time::Instant;

use super::hub::Hub;
use crate::application::ports::EventSink;
use crate::domain::connection::{DeliveryReport, Frame, Transport};
use crate::domain::events::{Delivery, SportsEvent};
use crate::domain::protocol::{JsonCodec, OutboundMessage};
use crate::domain::subscription::SubscriptionKind;
use crate::infrastructure::metrics::{self, BroadcastMode};

/// Fans outbound messages out to registered connections.
#[derive(Debug)]
pub struct Broadcaster {
    hub: Arc<Hub>,
    codec: JsonCodec,
}

impl Broadcaster {
    /// Create a broadcaster over a hub.
    #[must_use]
    pub const fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            codec: JsonCodec::new(),
        }
    }

    /// The hub this broadcaster delivers through.
    #[must_use]
    pub const fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Send a message to one client.
    ///
    /// Returns `true` if the frame was queued. Unknown or closed clients are
    /// dropped silently.
    pub fn unicast(&self, client_id: &str, message: &OutboundMessage) -> bool {
        let Some(frame) = self.encode(message) else {
            return false;
        };
        let message_type = message.type_name();

        if self.hub.is_shutting_down() {
            return false;
        }

        let started = Instant::now();
        let result = self.hub.read(|state| {
            state
                .connections
                .lookup(client_id)
                .map(|connection| connection.send(frame))
        });
        metrics::record_broadcast_duration(BroadcastMode::Unicast, started.elapsed());

        match result {
            Some(Ok(())) => {
                metrics::record_message_sent(message_type, 1);
                true
            }
            Some(Err(e)) => {
                tracing::debug!(client_id = %client_id, message_type, error = %e, "Unicast dropped");
                metrics::record_messages_dropped(message_type, 1);
                false
            }
            None => {
                tracing::debug!(client_id = %client_id, message_type, "Unicast to unknown client dropped");
                false
            }
        }
    }

    /// Answer a client on the transport its command arrived on.
    ///
    /// Unlike [`Broadcaster::unicast`] this does not consult the registry,
    /// so a superseded session still hears its own replies and never routes
    /// them to its successor. Returns `true` if the frame was queued.
    pub fn reply(&self, transport: &dyn Transport, message: &OutboundMessage) -> bool {
        let Some(frame) = self.encode(message) else {
            return false;
        };
        let message_type = message.type_name();

        if self.hub.is_shutting_down() {
            return false;
        }

        let started = Instant::now();
        let result = transport.send(frame);
        metrics::record_broadcast_duration(BroadcastMode::Unicast, started.elapsed());

        match result {
            Ok(()) => {
                metrics::record_message_sent(message_type, 1);
                true
            }
            Err(e) => {
                tracing::debug!(message_type, error = %e, "Reply dropped");
                metrics::record_messages_dropped(message_type, 1);
                false
            }
        }
    }

    /// Send a message to every open connection.
    pub fn broadcast_all(&self, message: &OutboundMessage) -> DeliveryReport {
        self.encode(message).map_or_else(DeliveryReport::default, |frame| {
            self.deliver(&frame, message.type_name(), Delivery::All)
        })
    }

    /// Send a message to the clients whose `kind` set contains `key`.
    pub fn broadcast_filtered(
        &self,
        message: &OutboundMessage,
        key: &str,
        kind: SubscriptionKind,
    ) -> DeliveryReport {
        self.encode(message).map_or_else(DeliveryReport::default, |frame| {
            self.deliver(&frame, message.type_name(), Delivery::Filtered { kind, key })
        })
    }

    fn encode(&self, message: &OutboundMessage) -> Option<Frame> {
        match self.codec.encode(message) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::error!(message_type = message.type_name(), error = %e, "Failed to encode message");
                None
            }
        }
    }

    fn deliver(&self, frame: &Frame, message_type: &'static str, delivery: Delivery<'_>) -> DeliveryReport {
        if self.hub.is_shutting_down() {
            return DeliveryReport::default();
        }

        let started = Instant::now();
        let (report, mode) = self.hub.read(|state| match delivery {
            Delivery::All => (
                state
                    .connections
                    .for_each_open(|_, connection| connection.send(Arc::clone(frame))),
                BroadcastMode::All,
            ),
            Delivery::Filtered { kind, key } => {
                let mut report = DeliveryReport::default();
                for client_id in state.subscriptions.subscribers(kind, key) {
                    // Subscription entries without a live connection are never targeted
                    let Some(connection) = state.connections.lookup(client_id) else {
                        continue;
                    };
                    if !connection.is_open() {
                        report.skipped += 1;
                        continue;
                    }
                    let result = connection.send(Arc::clone(frame));
                    if let Err(e) = result {
                        tracing::debug!(client_id = %client_id, error = %e, "Send to connection failed");
                    }
                    report.record(result);
                }
                (report, BroadcastMode::Filtered)
            }
        });
        metrics::record_broadcast_duration(mode, started.elapsed());

        metrics::record_message_sent(message_type, report.delivered);
        metrics::record_messages_dropped(message_type, report.failed);

        tracing::trace!(
            message_type,
            mode = mode.as_str(),
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            "Frame fanned out"
        );

        report
    }
}

impl EventSink for Broadcaster {
    fn publish(&self, event: &SportsEvent) -> DeliveryReport {
        let message = OutboundMessage::from_event(event);

        match event.delivery() {
            Delivery::All => self.broadcast_all(&message),
            Delivery::Filtered { kind, key } => self.broadcast_filtered(&message, key, kind),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
