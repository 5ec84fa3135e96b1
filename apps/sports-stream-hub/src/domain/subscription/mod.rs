//! Subscription Management Types
//!
//! Domain types for tracking which games, players and teams each client
//! wants to hear about.
//!
//! # Design
//!
//! The store keeps one [`SubscriptionSet`] per client identifier. Each set
//! holds three independent identifier sets, so a client can follow many
//! games and drop one of them without touching the rest.
//!
//! Membership is a plain set: subscribing twice is the same as once and
//! removing something that was never added is a no-op.
//!
//! The store is not synchronized on its own. The hub owns it together
//! with the connection registry behind a single lock.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

// =============================================================================
// Types
// =============================================================================

/// An opaque game, player or team identifier.
pub type EntityId = String;

/// Which identifier set a subscription targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionKind {
    /// Game identifiers.
    Games,
    /// Player identifiers.
    Players,
    /// Team identifiers.
    Teams,
}

impl SubscriptionKind {
    /// Get all subscription kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Games, Self::Players, Self::Teams]
    }

    /// Lowercase name for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Games => "games",
            Self::Players => "players",
            Self::Teams => "teams",
        }
    }
}

// =============================================================================
// Subscription Set
// =============================================================================

/// Everything one client is subscribed to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionSet {
    /// Subscribed game identifiers.
    pub games: HashSet<EntityId>,
    /// Subscribed player identifiers.
    pub players: HashSet<EntityId>,
    /// Subscribed team identifiers.
    pub teams: HashSet<EntityId>,
}

impl SubscriptionSet {
    /// The identifier set for a kind.
    #[must_use]
    pub const fn get(&self, kind: SubscriptionKind) -> &HashSet<EntityId> {
        match kind {
            SubscriptionKind::Games => &self.games,
            SubscriptionKind::Players => &self.players,
            SubscriptionKind::Teams => &self.teams,
        }
    }

    const fn get_mut(&mut self, kind: SubscriptionKind) -> &mut HashSet<EntityId> {
        match kind {
            SubscriptionKind::Games => &mut self.games,
            SubscriptionKind::Players => &mut self.players,
            SubscriptionKind::Teams => &mut self.teams,
        }
    }

    /// Whether `key` is in the set for `kind`.
    #[must_use]
    pub fn contains(&self, kind: SubscriptionKind, key: &str) -> bool {
        self.get(kind).contains(key)
    }

    /// Total identifiers across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.games.len() + self.players.len() + self.teams.len()
    }

    /// Whether nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Subscription Store
// =============================================================================

/// Per-client subscription sets.
///
/// # Example
///
/// ```rust
/// use sports_stream_hub::domain::subscription::{SubscriptionKind, SubscriptionStore};
///
/// let mut store = SubscriptionStore::new();
///
/// let added = store.subscribe("alice", SubscriptionKind::Games, ["G1".to_string()]);
/// assert_eq!(added, 1);
///
/// // Subscribing again changes nothing
/// let added = store.subscribe("alice", SubscriptionKind::Games, ["G1".to_string()]);
/// assert_eq!(added, 0);
///
/// assert!(store.matches("alice", SubscriptionKind::Games, "G1"));
///
/// store.purge("alice");
/// assert!(store.snapshot("alice").is_empty());
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionStore {
    clients: HashMap<String, SubscriptionSet>,
}

impl SubscriptionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty entry for a client if none exists.
    pub fn ensure(&mut self, client_id: &str) {
        if !self.clients.contains_key(client_id) {
            self.clients
                .insert(client_id.to_string(), SubscriptionSet::default());
        }
    }

    /// Whether the client has an entry.
    #[must_use]
    pub fn contains_client(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Union `ids` into the client's set for `kind`, creating the entry if
    /// needed.
    ///
    /// Returns how many identifiers were newly added.
    pub fn subscribe(
        &mut self,
        client_id: &str,
        kind: SubscriptionKind,
        ids: impl IntoIterator<Item = EntityId>,
    ) -> usize {
        self.ensure(client_id);
        let Some(set) = self.clients.get_mut(client_id) else {
            return 0;
        };
        let target = set.get_mut(kind);

        ids.into_iter().filter(|id| target.insert(id.clone())).count()
    }

    /// Remove `ids` from the client's set for `kind`.
    ///
    /// Returns how many identifiers were actually removed. Unknown clients
    /// and identifiers are ignored.
    pub fn unsubscribe<'a>(
        &mut self,
        client_id: &str,
        kind: SubscriptionKind,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> usize {
        let Some(set) = self.clients.get_mut(client_id) else {
            return 0;
        };
        let target = set.get_mut(kind);

        ids.into_iter().filter(|id| target.remove(*id)).count()
    }

    /// Copy of the client's subscriptions (empty if unknown).
    #[must_use]
    pub fn snapshot(&self, client_id: &str) -> SubscriptionSet {
        self.clients.get(client_id).cloned().unwrap_or_default()
    }

    /// Drop the client's entry entirely. Idempotent.
    ///
    /// Returns the removed set, if there was one.
    pub fn purge(&mut self, client_id: &str) -> Option<SubscriptionSet> {
        self.clients.remove(client_id)
    }

    /// Whether the client's set for `kind` contains `key`.
    #[must_use]
    pub fn matches(&self, client_id: &str, kind: SubscriptionKind, key: &str) -> bool {
        self.clients
            .get(client_id)
            .is_some_and(|set| set.contains(kind, key))
    }

    /// Clients whose set for `kind` contains `key`.
    pub fn subscribers<'a>(
        &'a self,
        kind: SubscriptionKind,
        key: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.clients
            .iter()
            .filter(move |(_, set)| set.contains(kind, key))
            .map(|(client_id, _)| client_id.as_str())
    }

    /// Sum of set sizes over all clients and kinds.
    #[must_use]
    pub fn total_subscriptions(&self) -> usize {
        self.clients.values().map(SubscriptionSet::len).sum()
    }

    /// Number of clients with an entry.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.clients.clear();
    }

    /// Statistics for one kind.
    #[must_use]
    pub fn stats(&self, kind: SubscriptionKind) -> SubscriptionStats {
        let mut entities = HashSet::new();
        let mut client_count = 0;

        for set in self.clients.values() {
            let ids = set.get(kind);
            if !ids.is_empty() {
                client_count += 1;
                entities.extend(ids.iter().map(String::as_str));
            }
        }

        SubscriptionStats {
            entity_count: entities.len(),
            client_count,
        }
    }

    /// Statistics for every kind.
    #[must_use]
    pub fn total_stats(&self) -> TotalSubscriptionStats {
        TotalSubscriptionStats {
            games: self.stats(SubscriptionKind::Games),
            players: self.stats(SubscriptionKind::Players),
            teams: self.stats(SubscriptionKind::Teams),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics for a single subscription kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionStats {
    /// Number of distinct identifiers anyone follows.
    pub entity_count: usize,
    /// Number of clients following at least one identifier.
    pub client_count: usize,
}

/// Statistics across all kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TotalSubscriptionStats {
    /// Game subscription stats.
    pub games: SubscriptionStats,
    /// Player subscription stats.
    pub players: SubscriptionStats,
    /// Team subscription stats.
    pub teams: SubscriptionStats,
}

// =============================================================================
// Tests
// =============================================================================
