//! Connection Tracking Types
//!
//! Domain types for client connections: identifiers, the per-connection
//! lifecycle state machine, the transport port used to push frames, and
//! the registry mapping client identifiers to their current connection.
//!
//! # Design
//!
//! The registry holds at most one connection per client identifier.
//! Registering again for the same identifier supersedes the earlier
//! connection: it is removed from the registry (and so becomes unreachable)
//! but is not closed by the registry. Its session notices on its own.
//!
//! The registry never blocks: frames are handed to [`Transport::send`],
//! which implementations must back with a non-blocking queue.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

// =============================================================================
// Types
// =============================================================================

/// Client identifier supplied at handshake. Opaque and unauthenticated.
pub type ClientId = String;

/// Unique identifier of one transport connection.
pub type ConnectionId = u64;

/// One encoded outbound message, shared across every recipient.
pub type Frame = Arc<str>;

/// Identifier used when the client does not supply one.
pub const ANONYMOUS_CLIENT_ID: &str = "anonymous";

/// Errors surfaced by a transport when a frame cannot be handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The connection is closed or its receiving side went away.
    #[error("connection closed")]
    Closed,
    /// The per-connection outbound queue is full; the frame was dropped.
    #[error("outbound queue full")]
    Full,
}

// =============================================================================
// Transport Port
// =============================================================================

/// Outbound side of a client transport.
///
/// Implementations must not block: `send` either enqueues the frame or
/// fails immediately.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Hand a frame to the transport.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] if the peer is gone and
    /// [`SendError::Full`] if the outbound queue has no room.
    fn send(&self, frame: Frame) -> Result<(), SendError>;

    /// Whether the underlying transport has been closed.
    fn is_closed(&self) -> bool;
}

// =============================================================================
// Lifecycle State Machine
// =============================================================================

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Transport handshake in progress, not yet registered.
    Connecting,
    /// Registered and eligible for send and receive.
    Open,
    /// Terminal.
    Closed,
}

/// Discrete events that drive the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The connection was registered with the hub.
    Registered,
    /// The transport reported that it closed.
    TransportClosed,
    /// The server is shutting down.
    Shutdown,
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// No transition leaves `Closed`.
    #[error("connection already closed, cannot apply {0:?}")]
    AlreadyClosed(LifecycleEvent),
    /// The event is not valid in the current state.
    #[error("invalid transition from {from:?} on {event:?}")]
    Invalid {
        /// State the connection was in.
        from: ConnectionState,
        /// Event that was rejected.
        event: LifecycleEvent,
    },
}

impl ConnectionState {
    /// Compute the next state for an event.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the event is not valid in this state.
    pub const fn apply(self, event: LifecycleEvent) -> Result<Self, TransitionError> {
        match (self, event) {
            (Self::Closed, event) => Err(TransitionError::AlreadyClosed(event)),
            (Self::Connecting, LifecycleEvent::Registered) => Ok(Self::Open),
            (Self::Connecting | Self::Open, LifecycleEvent::TransportClosed | LifecycleEvent::Shutdown) => {
                Ok(Self::Closed)
            }
            (Self::Open, LifecycleEvent::Registered) => Err(TransitionError::Invalid {
                from: self,
                event,
            }),
        }
    }

    /// Lowercase name for logs and health output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// A registered client connection.
pub struct Connection {
    id: ConnectionId,
    transport: Arc<dyn Transport>,
    state: ConnectionState,
    connected_at: DateTime<Utc>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create an open connection over the given transport.
    #[must_use]
    pub fn open(id: ConnectionId, transport: Arc<dyn Transport>) -> Self {
        Self {
            id,
            transport,
            state: ConnectionState::Open,
            connected_at: Utc::now(),
        }
    }

    /// Connection identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Lifecycle state as seen by the registry.
    ///
    /// The registry only marks a connection closed on shutdown. Otherwise a
    /// peer going away is observed through the transport, and an open
    /// connection whose transport has closed reports
    /// [`ConnectionState::Closed`].
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        if self.state == ConnectionState::Open && self.transport.is_closed() {
            ConnectionState::Closed
        } else {
            self.state
        }
    }

    /// When the connection was registered.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Open and the transport has not gone away.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Send a frame if the connection is open.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Closed`] for closed connections, otherwise
    /// whatever the transport reports.
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        self.transport.send(frame)
    }

    /// Mark the connection closed.
    pub const fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

// =============================================================================
// Delivery Report
// =============================================================================

/// Outcome counts of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Frames handed to a transport.
    pub delivered: usize,
    /// Sends that failed (closed mid-send or full queue).
    pub failed: usize,
    /// Connections skipped because they were already closed.
    pub skipped: usize,
}

impl DeliveryReport {
    /// Record the result of one send attempt.
    pub const fn record(&mut self, result: Result<(), SendError>) {
        match result {
            Ok(()) => self.delivered += 1,
            Err(_) => self.failed += 1,
        }
    }
}

// =============================================================================
// Connection Registry
// =============================================================================

/// Currently registered connections keyed by client identifier.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ClientId, Connection>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the connection for a client.
    ///
    /// Returns the superseded connection, if any.
    pub fn register(&mut self, client_id: ClientId, connection: Connection) -> Option<Connection> {
        self.connections.insert(client_id, connection)
    }

    /// Remove the connection for a client. No-op if absent.
    pub fn unregister(&mut self, client_id: &str) -> Option<Connection> {
        self.connections.remove(client_id)
    }

    /// Remove the client's connection only if it is `connection_id`.
    ///
    /// A superseded session that closes late must not evict its successor.
    pub fn unregister_connection(
        &mut self,
        client_id: &str,
        connection_id: ConnectionId,
    ) -> Option<Connection> {
        match self.connections.get(client_id) {
            Some(current) if current.id() == connection_id => self.connections.remove(client_id),
            _ => None,
        }
    }

    /// Look up the current connection for a client.
    #[must_use]
    pub fn lookup(&self, client_id: &str) -> Option<&Connection> {
        self.connections.get(client_id)
    }

    /// Invoke `f` for every open connection.
    ///
    /// Closed connections are skipped. A failing call is counted and
    /// iteration continues with the next connection.
    pub fn for_each_open<F>(&self, mut f: F) -> DeliveryReport
    where
        F: FnMut(&str, &Connection) -> Result<(), SendError>,
    {
        let mut report = DeliveryReport::default();

        for (client_id, connection) in &self.connections {
            if !connection.is_open() {
                report.skipped += 1;
                continue;
            }

            let result = f(client_id, connection);
            if let Err(e) = result {
                tracing::debug!(client_id = %client_id, error = %e, "Send to connection failed");
            }
            report.record(result);
        }

        report
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Registered client identifiers, sorted.
    #[must_use]
    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<_> = self.connections.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Close and drop every connection. Returns how many were removed.
    pub fn close_all(&mut self) -> usize {
        let count = self.connections.len();
        for connection in self.connections.values_mut() {
            connection.close();
        }
        self.connections.clear();
        count
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Transport that records frames in memory.
    #[derive(Default)]
    struct RecordingTransport {
        frames: Mutex<Vec<String>>,
        closed: bool,
    }

    impl Transport for RecordingTransport {
        fn send(&self, frame: Frame) -> Result<(), SendError> {
            self.frames.lock().unwrap().push(frame.to_string());
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    fn recording() -> Arc<RecordingTransport> {
        Arc::new(RecordingTransport::default())
    }

    #[test]
    fn lifecycle_happy_path() {
        let state = ConnectionState::Connecting;
        let state = state.apply(LifecycleEvent::Registered).unwrap();
        assert_eq!(state, ConnectionState::Open);

        let state = state.apply(LifecycleEvent::TransportClosed).unwrap();
        assert_eq!(state, ConnectionState::Closed);
    }

    #[test]
    fn lifecycle_shutdown_closes_connecting() {
        let state = ConnectionState::Connecting
            .apply(LifecycleEvent::Shutdown)
            .unwrap();
        assert_eq!(state, ConnectionState::Closed);
    }

    #[test]
    fn lifecycle_closed_is_terminal() {
        for event in [
            LifecycleEvent::Registered,
            LifecycleEvent::TransportClosed,
            LifecycleEvent::Shutdown,
        ] {
            assert_eq!(
                ConnectionState::Closed.apply(event),
                Err(TransitionError::AlreadyClosed(event))
            );
        }
    }

    #[test]
    fn lifecycle_double_registration_rejected() {
        let result = ConnectionState::Open.apply(LifecycleEvent::Registered);
        assert!(matches!(result, Err(TransitionError::Invalid { .. })));
    }

    #[test]
    fn register_replaces_existing_connection() {
        let mut registry = ConnectionRegistry::new();
        let first = recording();
        let second = recording();

        assert!(
            registry
                .register("alice".to_string(), Connection::open(1, first.clone()))
                .is_none()
        );
        let superseded = registry
            .register("alice".to_string(), Connection::open(2, second.clone()))
            .unwrap();

        assert_eq!(superseded.id(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("alice").unwrap().id(), 2);

        registry.for_each_open(|_, conn| conn.send(Arc::from("hello")));

        assert!(first.frames.lock().unwrap().is_empty());
        assert_eq!(second.frames.lock().unwrap().as_slice(), ["hello"]);
    }

    #[test]
    fn unregister_absent_is_noop() {
        let mut registry = ConnectionRegistry::new();
        assert!(registry.unregister("ghost").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_connection_ignores_stale_id() {
        let mut registry = ConnectionRegistry::new();
        registry.register("alice".to_string(), Connection::open(1, recording()));
        registry.register("alice".to_string(), Connection::open(2, recording()));

        // The superseded connection closing must not evict the new one
        assert!(registry.unregister_connection("alice", 1).is_none());
        assert_eq!(registry.lookup("alice").unwrap().id(), 2);

        assert!(registry.unregister_connection("alice", 2).is_some());
        assert!(registry.lookup("alice").is_none());
    }

    #[test]
    fn for_each_open_skips_closed_transports() {
        let mut registry = ConnectionRegistry::new();
        let open = recording();
        let closed = Arc::new(RecordingTransport {
            closed: true,
            ..RecordingTransport::default()
        });

        registry.register("open".to_string(), Connection::open(1, open.clone()));
        registry.register("closed".to_string(), Connection::open(2, closed.clone()));

        let report = registry.for_each_open(|_, conn| conn.send(Arc::from("tick")));

        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(open.frames.lock().unwrap().len(), 1);
        assert!(closed.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn for_each_open_isolates_failures() {
        let mut registry = ConnectionRegistry::new();

        let mut failing = MockTransport::new();
        failing.expect_is_closed().return_const(false);
        failing.expect_send().returning(|_| Err(SendError::Full));

        let healthy = recording();

        registry.register("failing".to_string(), Connection::open(1, Arc::new(failing)));
        registry.register("healthy".to_string(), Connection::open(2, healthy.clone()));

        let report = registry.for_each_open(|_, conn| conn.send(Arc::from("goal")));

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(healthy.frames.lock().unwrap().as_slice(), ["goal"]);
    }

    #[test]
    fn closed_connection_refuses_send() {
        let transport = recording();
        let mut connection = Connection::open(7, transport.clone());
        connection.close();

        assert_eq!(connection.send(Arc::from("late")), Err(SendError::Closed));
        assert!(transport.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn closed_transport_reports_closed_state() {
        let mut gone = MockTransport::new();
        gone.expect_is_closed().return_const(true);
        let connection = Connection::open(8, Arc::new(gone));

        assert_eq!(connection.state(), ConnectionState::Closed);
        assert!(!connection.is_open());
    }

    #[test]
    fn live_transport_reports_open_state() {
        let connection = Connection::open(9, recording());

        assert_eq!(connection.state(), ConnectionState::Open);
        assert!(connection.is_open());
    }

    #[test]
    fn close_all_drains_registry() {
        let mut registry = ConnectionRegistry::new();
        registry.register("a".to_string(), Connection::open(1, recording()));
        registry.register("b".to_string(), Connection::open(2, recording()));

        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn client_ids_are_sorted() {
        let mut registry = ConnectionRegistry::new();
        registry.register("carol".to_string(), Connection::open(1, recording()));
        registry.register("alice".to_string(), Connection::open(2, recording()));
        registry.register("bob".to_string(), Connection::open(3, recording()));

        assert_eq!(registry.client_ids(), vec!["alice", "bob", "carol"]);
    }
}
