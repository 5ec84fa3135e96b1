//! Message Router
//!
//! Decodes client text frames and applies them: subscription commands
//! mutate the hub, `PING` is answered with a `PONG` on the sender's own
//! transport.
//!
//! Every frame carries its [`Origin`]. Subscription commands from a
//! connection that has since been superseded are ignored, so a stale
//! socket can never change what its successor receives.
//!
//! Bad input never closes a connection. Malformed frames are logged at
//! warn, unknown command types at debug, and both are otherwise ignored.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::broadcaster::Broadcaster;
use crate::domain::connection::{ConnectionId, Transport};
use crate::domain::protocol::{CodecError, InboundMessage, JsonCodec, OutboundMessage};
use crate::domain::subscription::SubscriptionKind;
use crate::infrastructure::metrics;

/// The connection a client frame arrived on.
#[derive(Clone, Copy)]
pub struct Origin<'a> {
    /// Client the connection was opened for.
    pub client_id: &'a str,
    /// Connection the frame was read from.
    pub connection_id: ConnectionId,
    /// Outbound queue of that same connection.
    pub reply_to: &'a dyn Transport,
}

/// What handling one frame did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Identifiers were added to a subscription set.
    Subscribed {
        /// Set that was extended.
        kind: SubscriptionKind,
        /// Newly added identifiers.
        added: usize,
    },
    /// Identifiers were removed from a subscription set.
    Unsubscribed {
        /// Set that was reduced.
        kind: SubscriptionKind,
        /// Identifiers actually removed.
        removed: usize,
    },
    /// A `PONG` was answered.
    Pong {
        /// Whether the reply was queued to the client.
        delivered: bool,
    },
    /// The frame was not a valid command.
    Malformed,
    /// The frame had an unrecognized `type`.
    Unknown(String),
}

impl RouteOutcome {
    /// Label for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribed { .. } => "subscribed",
            Self::Unsubscribed { .. } => "unsubscribed",
            Self::Pong { .. } => "pong",
            Self::Malformed => "malformed",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Dispatches client frames.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    broadcaster: Arc<Broadcaster>,
    codec: JsonCodec,
}

impl MessageRouter {
    /// Create a router that answers through `broadcaster`.
    #[must_use]
    pub const fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            broadcaster,
            codec: JsonCodec::new(),
        }
    }

    /// Handle one text frame received on `origin` at `received_at`.
    pub fn handle(&self, origin: &Origin<'_>, raw: &str, received_at: DateTime<Utc>) -> RouteOutcome {
        let client_id = origin.client_id;
        let outcome = match self.codec.decode_inbound(raw) {
            Ok(message) => self.dispatch(origin, message, received_at),
            Err(CodecError::UnknownMessageType(name)) => {
                tracing::debug!(client_id = %client_id, message_type = %name, "Ignoring unknown message type");
                RouteOutcome::Unknown(name)
            }
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, "Malformed client message");
                RouteOutcome::Malformed
            }
        };

        metrics::record_inbound(outcome.as_str());
        outcome
    }

    fn dispatch(
        &self,
        origin: &Origin<'_>,
        message: InboundMessage,
        received_at: DateTime<Utc>,
    ) -> RouteOutcome {
        let hub = self.broadcaster.hub();
        let Origin {
            client_id,
            connection_id,
            reply_to,
        } = *origin;
        tracing::debug!(
            client_id = %client_id,
            connection_id,
            message_type = message.type_name(),
            "Client message"
        );

        match message {
            InboundMessage::SubscribeGames { game_ids } => {
                let kind = SubscriptionKind::Games;
                let added = hub.subscribe_from(client_id, connection_id, kind, game_ids);
                RouteOutcome::Subscribed { kind, added }
            }
            InboundMessage::SubscribePlayers { player_ids } => {
                let kind = SubscriptionKind::Players;
                let added = hub.subscribe_from(client_id, connection_id, kind, player_ids);
                RouteOutcome::Subscribed { kind, added }
            }
            InboundMessage::UnsubscribeGames { game_ids } => {
                let kind = SubscriptionKind::Games;
                let removed = hub.unsubscribe_from(
                    client_id,
                    connection_id,
                    kind,
                    game_ids.iter().map(String::as_str),
                );
                RouteOutcome::Unsubscribed { kind, removed }
            }
            InboundMessage::Ping => {
                // Clock steps backwards must not produce a pong older than its ping
                let timestamp = Utc::now().max(received_at);
                let delivered = self
                    .broadcaster
                    .reply(reply_to, &OutboundMessage::Pong { timestamp });
                RouteOutcome::Pong { delivered }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use parking_lot::Mutex;

    use super::*;
    use crate::application::services::hub::Hub;
    use crate::domain::connection::{Connection, Frame, SendError};

    #[derive(Default)]
    struct RecordingTransport {
        frames: Mutex<Vec<Frame>>,
    }

    impl Transport for RecordingTransport {
        fn send(&self, frame: Frame) -> Result<(), SendError> {
            self.frames.lock().push(frame);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    struct Client {
        id: &'static str,
        connection_id: ConnectionId,
        transport: Arc<RecordingTransport>,
    }

    impl Client {
        fn connect(hub: &Hub, id: &'static str) -> Self {
            let transport = Arc::new(RecordingTransport::default());
            let connection_id = Hub::next_connection_id();
            hub.register(id, Connection::open(connection_id, transport.clone()))
                .unwrap();
            Self {
                id,
                connection_id,
                transport,
            }
        }

        fn origin(&self) -> Origin<'_> {
            Origin {
                client_id: self.id,
                connection_id: self.connection_id,
                reply_to: self.transport.as_ref(),
            }
        }
    }

    fn setup(client_id: &'static str) -> (Arc<Hub>, MessageRouter, Client) {
        let hub = Arc::new(Hub::new());
        let router = MessageRouter::new(Arc::new(Broadcaster::new(Arc::clone(&hub))));
        let client = Client::connect(&hub, client_id);
        (hub, router, client)
    }

    #[test]
    fn subscribe_and_unsubscribe_games() {
        let (hub, router, alice) = setup("alice");
        let now = Utc::now();

        let outcome = router.handle(&alice.origin(), r#"{"type":"SUBSCRIBE_GAMES","gameIds":["G1","G2"]}"#, now);
        assert_eq!(
            outcome,
            RouteOutcome::Subscribed {
                kind: SubscriptionKind::Games,
                added: 2
            }
        );

        let outcome = router.handle(&alice.origin(), r#"{"type":"UNSUBSCRIBE_GAMES","gameIds":["G2","G9"]}"#, now);
        assert_eq!(
            outcome,
            RouteOutcome::Unsubscribed {
                kind: SubscriptionKind::Games,
                removed: 1
            }
        );

        let games = hub.subscriptions("alice").games;
        assert_eq!(games.len(), 1);
        assert!(games.contains("G1"));
    }

    #[test]
    fn subscribe_is_idempotent() {
        let (hub, router, alice) = setup("alice");
        let frame = r#"{"type":"SUBSCRIBE_PLAYERS","playerIds":["P1"]}"#;

        router.handle(&alice.origin(), frame, Utc::now());
        let outcome = router.handle(&alice.origin(), frame, Utc::now());

        assert_eq!(
            outcome,
            RouteOutcome::Subscribed {
                kind: SubscriptionKind::Players,
                added: 0
            }
        );
        assert_eq!(hub.subscriptions("alice").players.len(), 1);
    }

    #[test]
    fn ping_answers_pong_not_before_receipt() {
        let (_, router, alice) = setup("alice");
        // A receipt time in the future forces the clamp
        let received_at = Utc::now() + Duration::seconds(5);

        let outcome = router.handle(&alice.origin(), r#"{"type":"PING"}"#, received_at);
        assert_eq!(outcome, RouteOutcome::Pong { delivered: true });

        let frames = alice.transport.frames.lock();
        assert_eq!(frames.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(value["type"], "PONG");
        let timestamp: DateTime<Utc> = value["timestamp"].as_str().unwrap().parse().unwrap();
        assert!(timestamp >= received_at);
    }

    #[test]
    fn malformed_frame_has_no_effect() {
        let (hub, router, alice) = setup("alice");

        assert_eq!(router.handle(&alice.origin(), "{not json", Utc::now()), RouteOutcome::Malformed);
        assert!(hub.subscriptions("alice").is_empty());
        assert!(alice.transport.frames.lock().is_empty());
        assert!(hub.is_connected("alice"));
    }

    #[test]
    fn unknown_type_is_dropped() {
        let (hub, router, alice) = setup("alice");

        let outcome = router.handle(&alice.origin(), r#"{"type":"SUBSCRIBE_TEAMS","teamIds":["T1"]}"#, Utc::now());

        assert_eq!(outcome, RouteOutcome::Unknown("SUBSCRIBE_TEAMS".to_string()));
        assert!(hub.subscriptions("alice").teams.is_empty());
    }

    #[test]
    fn commands_from_unregistered_client_are_noops() {
        let (hub, router, _) = setup("alice");
        let ghost = Client {
            id: "ghost",
            connection_id: Hub::next_connection_id(),
            transport: Arc::new(RecordingTransport::default()),
        };

        let outcome = router.handle(&ghost.origin(), r#"{"type":"SUBSCRIBE_GAMES","gameIds":["G1"]}"#, Utc::now());

        assert_eq!(
            outcome,
            RouteOutcome::Subscribed {
                kind: SubscriptionKind::Games,
                added: 0
            }
        );
        assert_eq!(hub.stats().total_subscriptions, 0);
    }

    #[test]
    fn superseded_connection_cannot_change_subscriptions() {
        let (hub, router, first) = setup("alice");
        router.handle(&first.origin(), r#"{"type":"SUBSCRIBE_GAMES","gameIds":["G1"]}"#, Utc::now());
        let second = Client::connect(&hub, "alice");

        let subscribed = router.handle(&first.origin(), r#"{"type":"SUBSCRIBE_GAMES","gameIds":["G9"]}"#, Utc::now());
        let unsubscribed = router.handle(&first.origin(), r#"{"type":"UNSUBSCRIBE_GAMES","gameIds":["G1"]}"#, Utc::now());

        assert_eq!(
            subscribed,
            RouteOutcome::Subscribed {
                kind: SubscriptionKind::Games,
                added: 0
            }
        );
        assert_eq!(
            unsubscribed,
            RouteOutcome::Unsubscribed {
                kind: SubscriptionKind::Games,
                removed: 0
            }
        );
        let games = hub.subscriptions("alice").games;
        assert_eq!(games.len(), 1);
        assert!(games.contains("G1"));
        assert!(second.transport.frames.lock().is_empty());
    }

    #[test]
    fn superseded_connection_gets_its_own_pong() {
        let (hub, router, first) = setup("alice");
        let second = Client::connect(&hub, "alice");

        let outcome = router.handle(&first.origin(), r#"{"type":"PING"}"#, Utc::now());

        assert_eq!(outcome, RouteOutcome::Pong { delivered: true });
        assert_eq!(first.transport.frames.lock().len(), 1);
        assert!(second.transport.frames.lock().is_empty());
    }
}
