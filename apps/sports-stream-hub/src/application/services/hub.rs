//! Hub - Shared Server Context
//!
//! Owns the connection registry and the subscription store together behind
//! one lock, so a client's connection and its subscriptions are always
//! added and removed as a unit.
//!
//! # Locking
//!
//! All state lives in [`HubState`] behind a single `parking_lot::RwLock`.
//! Mutations (register, disconnect, subscribe) take the write lock briefly.
//! Fan-out takes the read lock and only performs non-blocking sends while
//! holding it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::connection::{
    ClientId, Connection, ConnectionId, ConnectionRegistry, ConnectionState,
};
use crate::domain::subscription::{
    EntityId, SubscriptionKind, SubscriptionSet, SubscriptionStore, TotalSubscriptionStats,
};
use crate::infrastructure::metrics;

// =============================================================================
// State
// =============================================================================

/// Registry and subscriptions, guarded together.
#[derive(Debug, Default)]
pub struct HubState {
    /// Open connections by client identifier.
    pub connections: ConnectionRegistry,
    /// Subscriptions by client identifier.
    pub subscriptions: SubscriptionStore,
}

impl HubState {
    /// Whether a command from `client_id` may change hub state.
    ///
    /// The client must be registered and, when `origin` is given, that must
    /// be its registered connection.
    #[must_use]
    pub fn accepts_commands(&self, client_id: &str, origin: Option<ConnectionId>) -> bool {
        self.connections
            .lookup(client_id)
            .is_some_and(|connection| origin.is_none_or(|id| connection.id() == id))
    }
}

/// Result of registering a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// The registered connection.
    pub connection_id: ConnectionId,
    /// The connection it replaced, if the client was already connected.
    pub superseded: Option<ConnectionId>,
}

/// Hub errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The hub is shutting down and accepts no new connections.
    #[error("hub is shutting down")]
    ShuttingDown,
}

/// Operational snapshot returned by the stats query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    /// Registered connections.
    pub total_connections: usize,
    /// Registered client identifiers, sorted.
    pub active_users: Vec<ClientId>,
    /// Sum of all games/players/teams set sizes.
    pub total_subscriptions: usize,
    /// Seconds since the hub started.
    pub uptime: u64,
}

// =============================================================================
// Hub
// =============================================================================

/// Server context shared by the broadcaster, router and sessions.
///
/// # Example
///
/// ```rust
/// use sports_stream_hub::application::services::Hub;
///
/// let hub = Hub::new();
/// let stats = hub.stats();
/// assert_eq!(stats.total_connections, 0);
/// assert!(stats.active_users.is_empty());
/// ```
#[derive(Debug)]
pub struct Hub {
    state: RwLock<HubState>,
    started_at: Instant,
    shutting_down: AtomicBool,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            started_at: Instant::now(),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Allocate an identifier for a new transport connection.
    #[must_use]
    pub fn next_connection_id() -> ConnectionId {
        uuid::Uuid::new_v4().as_u64_pair().0
    }

    /// Register a connection for a client, superseding any previous one.
    ///
    /// The client's subscription entry is created if it does not exist and
    /// kept if it does.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::ShuttingDown`] once [`Hub::shutdown`] has run.
    pub fn register(
        &self,
        client_id: &str,
        connection: Connection,
    ) -> Result<Registration, HubError> {
        if self.is_shutting_down() {
            return Err(HubError::ShuttingDown);
        }

        let connection_id = connection.id();
        let (superseded, connection_count) = {
            let mut state = self.state.write();
            // Shutdown may have drained the registry while we waited for the lock
            if self.is_shutting_down() {
                return Err(HubError::ShuttingDown);
            }
            let superseded = state
                .connections
                .register(client_id.to_string(), connection)
                .map(|previous| previous.id());
            state.subscriptions.ensure(client_id);
            (superseded, state.connections.len())
        };

        if let Some(previous) = superseded {
            tracing::warn!(
                client_id = %client_id,
                connection_id,
                superseded = previous,
                "Client reconnected, previous connection superseded"
            );
        } else {
            tracing::info!(client_id = %client_id, connection_id, "Client connected");
        }

        metrics::record_connection_opened();
        metrics::set_connections(connection_count);

        Ok(Registration {
            connection_id,
            superseded,
        })
    }

    /// Remove a client's connection and subscriptions, but only if
    /// `connection_id` is still the registered one.
    ///
    /// Returns `true` if anything was removed.
    pub fn disconnect(&self, client_id: &str, connection_id: ConnectionId) -> bool {
        let (removed, connection_count, total_subscriptions) = {
            let mut state = self.state.write();
            let removed = state
                .connections
                .unregister_connection(client_id, connection_id);
            if removed.is_some() {
                state.subscriptions.purge(client_id);
            }
            (
                removed.is_some(),
                state.connections.len(),
                state.subscriptions.total_subscriptions(),
            )
        };

        if removed {
            tracing::info!(client_id = %client_id, connection_id, "Client disconnected");
            metrics::record_connection_closed();
            metrics::set_connections(connection_count);
            metrics::set_subscriptions(total_subscriptions);
        } else {
            tracing::debug!(
                client_id = %client_id,
                connection_id,
                "Superseded connection closed, registry untouched"
            );
        }

        removed
    }

    /// Remove a client's connection and subscriptions unconditionally.
    ///
    /// No-op if the client is unknown.
    pub fn unregister(&self, client_id: &str) -> bool {
        let connection_id = self
            .state
            .read()
            .connections
            .lookup(client_id)
            .map(Connection::id);

        connection_id.is_some_and(|id| self.disconnect(client_id, id))
    }

    /// Add identifiers to a registered client's subscriptions.
    ///
    /// Returns how many identifiers were newly added. Unregistered clients
    /// are ignored.
    pub fn subscribe(
        &self,
        client_id: &str,
        kind: SubscriptionKind,
        ids: impl IntoIterator<Item = EntityId>,
    ) -> usize {
        self.apply_subscribe(client_id, None, kind, ids)
    }

    /// Add identifiers on behalf of a specific connection.
    ///
    /// Ignored unless `connection_id` is the client's registered connection,
    /// so a superseded session cannot change its successor's interests.
    pub fn subscribe_from(
        &self,
        client_id: &str,
        connection_id: ConnectionId,
        kind: SubscriptionKind,
        ids: impl IntoIterator<Item = EntityId>,
    ) -> usize {
        self.apply_subscribe(client_id, Some(connection_id), kind, ids)
    }

    /// Remove identifiers from a client's subscriptions.
    ///
    /// Returns how many identifiers were removed. Unknown clients and
    /// identifiers are ignored.
    pub fn unsubscribe<'a>(
        &self,
        client_id: &str,
        kind: SubscriptionKind,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> usize {
        self.apply_unsubscribe(client_id, None, kind, ids)
    }

    /// Remove identifiers on behalf of a specific connection.
    ///
    /// Ignored unless `connection_id` is the client's registered connection.
    pub fn unsubscribe_from<'a>(
        &self,
        client_id: &str,
        connection_id: ConnectionId,
        kind: SubscriptionKind,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> usize {
        self.apply_unsubscribe(client_id, Some(connection_id), kind, ids)
    }

    fn apply_subscribe(
        &self,
        client_id: &str,
        origin: Option<ConnectionId>,
        kind: SubscriptionKind,
        ids: impl IntoIterator<Item = EntityId>,
    ) -> usize {
        let (added, total) = {
            let mut state = self.state.write();
            if !state.accepts_commands(client_id, origin) {
                drop(state);
                tracing::debug!(
                    client_id = %client_id,
                    connection_id = ?origin,
                    kind = kind.as_str(),
                    "Subscribe from unknown or superseded connection ignored"
                );
                return 0;
            }
            let added = state.subscriptions.subscribe(client_id, kind, ids);
            (added, state.subscriptions.total_subscriptions())
        };

        metrics::set_subscriptions(total);
        added
    }

    fn apply_unsubscribe<'a>(
        &self,
        client_id: &str,
        origin: Option<ConnectionId>,
        kind: SubscriptionKind,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> usize {
        let (removed, total) = {
            let mut state = self.state.write();
            if origin.is_some() && !state.accepts_commands(client_id, origin) {
                drop(state);
                tracing::debug!(
                    client_id = %client_id,
                    connection_id = ?origin,
                    kind = kind.as_str(),
                    "Unsubscribe from superseded connection ignored"
                );
                return 0;
            }
            let removed = state.subscriptions.unsubscribe(client_id, kind, ids);
            (removed, state.subscriptions.total_subscriptions())
        };

        metrics::set_subscriptions(total);
        removed
    }

    /// Whether `connection_id` is the client's registered connection.
    #[must_use]
    pub fn is_current(&self, client_id: &str, connection_id: ConnectionId) -> bool {
        self.state
            .read()
            .accepts_commands(client_id, Some(connection_id))
    }

    /// Copy of a client's subscriptions (empty if unknown).
    #[must_use]
    pub fn subscriptions(&self, client_id: &str) -> SubscriptionSet {
        self.state.read().subscriptions.snapshot(client_id)
    }

    /// Whether a client has a registered connection.
    #[must_use]
    pub fn is_connected(&self, client_id: &str) -> bool {
        self.state.read().connections.lookup(client_id).is_some()
    }

    /// Lifecycle state of a client's registered connection.
    #[must_use]
    pub fn connection_state(&self, client_id: &str) -> Option<ConnectionState> {
        self.state
            .read()
            .connections
            .lookup(client_id)
            .map(Connection::state)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.state.read().connections.len()
    }

    /// Operational stats.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let state = self.state.read();
        HubStats {
            total_connections: state.connections.len(),
            active_users: state.connections.client_ids(),
            total_subscriptions: state.subscriptions.total_subscriptions(),
            uptime: self.uptime().as_secs(),
        }
    }

    /// Per-kind subscription stats.
    #[must_use]
    pub fn subscription_stats(&self) -> TotalSubscriptionStats {
        self.state.read().subscriptions.total_stats()
    }

    /// Time since the hub was created.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Run `f` with shared access to the state.
    ///
    /// `f` runs under the read lock and must not block.
    pub fn read<R>(&self, f: impl FnOnce(&HubState) -> R) -> R {
        f(&self.state.read())
    }

    /// Close every connection and reject further registrations and sends.
    ///
    /// Returns how many connections were closed.
    pub fn shutdown(&self) -> usize {
        self.shutting_down.store(true, Ordering::SeqCst);

        let closed = {
            let mut state = self.state.write();
            let closed = state.connections.close_all();
            state.subscriptions.clear();
            closed
        };

        tracing::info!(closed, "Hub shut down");
        metrics::set_connections(0);
        metrics::set_subscriptions(0);
        closed
    }

    /// Whether [`Hub::shutdown`] has run.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::connection::{MockTransport, Transport};

    fn open_transport() -> Arc<dyn Transport> {
        let mut transport = MockTransport::new();
        transport.expect_is_closed().return_const(false);
        transport.expect_send().returning(|_| Ok(()));
        Arc::new(transport)
    }

    fn connect(hub: &Hub, client_id: &str) -> ConnectionId {
        let id = Hub::next_connection_id();
        hub.register(client_id, Connection::open(id, open_transport()))
            .unwrap()
            .connection_id
    }

    fn games(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn register_creates_subscription_entry() {
        let hub = Hub::new();
        connect(&hub, "alice");

        assert!(hub.is_connected("alice"));
        assert_eq!(hub.connection_state("alice"), Some(ConnectionState::Open));
        hub.read(|state| assert!(state.subscriptions.contains_client("alice")));
    }

    #[test]
    fn reregistration_supersedes_and_keeps_one_entry() {
        let hub = Hub::new();
        let first = connect(&hub, "alice");
        hub.subscribe("alice", SubscriptionKind::Games, games(&["G1"]));

        let second_id = Hub::next_connection_id();
        let registration = hub
            .register("alice", Connection::open(second_id, open_transport()))
            .unwrap();

        assert_eq!(registration.superseded, Some(first));
        assert_eq!(hub.connection_count(), 1);
        hub.read(|state| {
            assert_eq!(state.connections.lookup("alice").unwrap().id(), second_id);
        });
        // Subscriptions belong to the client, not the transport
        assert!(hub.subscriptions("alice").games.contains("G1"));
    }

    #[test]
    fn stale_disconnect_does_not_evict_successor() {
        let hub = Hub::new();
        let first = connect(&hub, "alice");
        let second = connect(&hub, "alice");
        hub.subscribe("alice", SubscriptionKind::Games, games(&["G1"]));

        assert!(!hub.disconnect("alice", first));
        assert!(hub.is_connected("alice"));
        assert!(hub.subscriptions("alice").games.contains("G1"));

        assert!(hub.disconnect("alice", second));
        assert!(!hub.is_connected("alice"));
    }

    #[test]
    fn disconnect_purges_subscriptions_and_stats() {
        let hub = Hub::new();
        let alice = connect(&hub, "alice");
        connect(&hub, "bob");
        hub.subscribe("alice", SubscriptionKind::Games, games(&["G1", "G2"]));

        hub.disconnect("alice", alice);

        let stats = hub.stats();
        assert_eq!(stats.total_connections, 1);
        assert_eq!(stats.active_users, vec!["bob"]);
        assert_eq!(stats.total_subscriptions, 0);
        hub.read(|state| assert!(!state.subscriptions.contains_client("alice")));
    }

    #[test]
    fn unregister_unknown_client_is_noop() {
        let hub = Hub::new();
        assert!(!hub.unregister("ghost"));
    }

    #[test]
    fn subscribe_for_unregistered_client_is_noop() {
        let hub = Hub::new();

        let added = hub.subscribe("ghost", SubscriptionKind::Games, games(&["G1"]));

        assert_eq!(added, 0);
        assert!(hub.subscriptions("ghost").is_empty());
        hub.read(|state| assert!(!state.subscriptions.contains_client("ghost")));
    }

    #[test]
    fn stats_count_all_kinds() {
        let hub = Hub::new();
        connect(&hub, "alice");
        connect(&hub, "bob");
        hub.subscribe("alice", SubscriptionKind::Games, games(&["G1", "G2"]));
        hub.subscribe("alice", SubscriptionKind::Players, games(&["P1"]));
        hub.subscribe("bob", SubscriptionKind::Teams, games(&["T1"]));

        let stats = hub.stats();
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.active_users, vec!["alice", "bob"]);
        assert_eq!(stats.total_subscriptions, 4);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalConnections"], 2);
        assert_eq!(json["totalSubscriptions"], 4);
        assert!(json["uptime"].is_u64());
        assert!(json["activeUsers"].is_array());
    }

    #[test]
    fn shutdown_rejects_new_registrations() {
        let hub = Hub::new();
        connect(&hub, "alice");

        assert_eq!(hub.shutdown(), 1);
        assert!(hub.is_shutting_down());
        assert_eq!(hub.connection_count(), 0);

        let result = hub.register(
            "bob",
            Connection::open(Hub::next_connection_id(), open_transport()),
        );
        assert_eq!(result, Err(HubError::ShuttingDown));
    }

    #[test]
    fn registration_racing_shutdown_leaves_registry_empty() {
        use std::thread;
        use std::time::Duration;

        let hub = Hub::new();

        thread::scope(|scope| {
            // Park both writers behind a reader so they contend for the lock
            let guard = hub.state.read();

            let register = scope.spawn(|| {
                hub.register(
                    "late",
                    Connection::open(Hub::next_connection_id(), open_transport()),
                )
            });
            thread::sleep(Duration::from_millis(50));

            let shutdown = scope.spawn(|| hub.shutdown());
            while !hub.is_shutting_down() {
                thread::yield_now();
            }

            drop(guard);
            let _ = register.join().unwrap();
            shutdown.join().unwrap();
        });

        assert_eq!(hub.connection_count(), 0);
        assert!(!hub.is_connected("late"));
    }

    #[test]
    fn subscription_commands_from_superseded_connection_are_ignored() {
        let hub = Hub::new();
        let first = connect(&hub, "alice");
        hub.subscribe_from("alice", first, SubscriptionKind::Games, games(&["G1"]));
        let second = connect(&hub, "alice");

        assert!(!hub.is_current("alice", first));
        assert!(hub.is_current("alice", second));
        assert_eq!(
            hub.subscribe_from("alice", first, SubscriptionKind::Games, games(&["G9"])),
            0
        );
        assert_eq!(
            hub.unsubscribe_from("alice", first, SubscriptionKind::Games, ["G1"]),
            0
        );
        assert_eq!(
            hub.subscribe_from("alice", second, SubscriptionKind::Games, games(&["G2"])),
            1
        );

        let subscriptions = hub.subscriptions("alice");
        assert!(subscriptions.games.contains("G1"));
        assert!(subscriptions.games.contains("G2"));
        assert!(!subscriptions.games.contains("G9"));
    }

    #[test]
    fn thread_safety_concurrent_subscriptions() {
        use std::thread;

        let hub = Arc::new(Hub::new());
        for i in 0..10 {
            connect(&hub, &format!("client{i}"));
        }

        let mut handles = vec![];
        for i in 0..10 {
            let hub = Arc::clone(&hub);
            handles.push(thread::spawn(move || {
                hub.subscribe(
                    &format!("client{i}"),
                    SubscriptionKind::Games,
                    vec![format!("G{i}"), "SHARED".to_string()],
                );
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = hub.subscription_stats();
        assert_eq!(stats.games.client_count, 10);
        // 10 unique games (G0-G9) + 1 shared = 11
        assert_eq!(stats.games.entity_count, 11);
        assert_eq!(hub.stats().total_subscriptions, 20);
    }

    #[test]
    fn thread_safety_concurrent_disconnects() {
        use std::thread;

        let hub = Arc::new(Hub::new());
        let mut ids = vec![];
        for i in 0..10 {
            let client = format!("client{i}");
            let id = connect(&hub, &client);
            hub.subscribe(&client, SubscriptionKind::Games, vec!["SHARED".to_string()]);
            ids.push((client, id));
        }

        let handles: Vec<_> = ids
            .into_iter()
            .map(|(client, id)| {
                let hub = Arc::clone(&hub);
                thread::spawn(move || hub.disconnect(&client, id))
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }

        let stats = hub.stats();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.total_subscriptions, 0);
    }
}
