//! Sports Event Types
//!
//! Core domain events produced by event sources: game updates, injury
//! updates and betting alerts. Every event is stamped with the time it was
//! generated, not the time it is delivered.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::subscription::SubscriptionKind;

// =============================================================================
// Game Updates
// =============================================================================

/// Current score of a game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    /// Home team points.
    pub home: u32,
    /// Away team points.
    pub away: u32,
}

/// Status of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// Not started yet.
    Scheduled,
    /// In play.
    InProgress,
    /// Halftime break.
    Halftime,
    /// Final whistle.
    Final,
    /// Postponed or suspended.
    Postponed,
}

/// Live update for a single game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdate {
    /// Game identifier used for filtering.
    pub game_id: String,
    /// Current score.
    pub score: Score,
    /// Game status.
    pub status: GameStatus,
    /// Game clock, e.g. `"Q3 08:42"`.
    pub time: String,
    /// Recent key plays, newest last.
    pub key_plays: Vec<String>,
    /// Per-player stat lines keyed by player identifier.
    pub player_updates: BTreeMap<String, serde_json::Value>,
}

// =============================================================================
// Injury Updates
// =============================================================================

/// Expected impact of an injury.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InjuryImpact {
    /// Little effect on the game.
    Low,
    /// Noticeable effect.
    Medium,
    /// Major effect.
    High,
}

/// Injury report for a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjuryUpdate {
    /// Player name or identifier.
    pub player: String,
    /// Team the player belongs to.
    pub team: String,
    /// Injury description.
    pub injury: String,
    /// Availability status, e.g. `"QUESTIONABLE"`.
    pub status: String,
    /// Expected impact.
    pub impact: InjuryImpact,
}

// =============================================================================
// Betting Alerts
// =============================================================================

/// Kind of market movement a betting alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BettingAlertKind {
    /// Significant line movement.
    LineMovement,
    /// Sharp money detected.
    SharpAction,
    /// Value opportunity versus model.
    ValueBet,
    /// Player prop opportunity.
    PropAlert,
}

/// Market alert for a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BettingAlert {
    /// Alert kind. Serialized as `type` on the wire.
    #[serde(rename = "type")]
    pub kind: BettingAlertKind,
    /// Game the alert concerns.
    pub game: String,
    /// Human readable description.
    pub description: String,
    /// Model confidence, 0-100.
    pub confidence: u8,
}

// =============================================================================
// Sports Event
// =============================================================================

/// Payload of a sports event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Game update, delivered to subscribers of the game.
    Game(GameUpdate),
    /// Injury update, delivered to everyone.
    Injury(InjuryUpdate),
    /// Betting alert, delivered to everyone.
    Betting(BettingAlert),
}

/// How an event is fanned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery<'a> {
    /// Every open connection.
    All,
    /// Connections whose `kind` set contains `key`.
    Filtered {
        /// Subscription kind to match.
        kind: SubscriptionKind,
        /// Identifier to match.
        key: &'a str,
    },
}

/// A sports event stamped with its generation time.
#[derive(Debug, Clone, PartialEq)]
pub struct SportsEvent {
    payload: EventPayload,
    generated_at: DateTime<Utc>,
}

impl SportsEvent {
    /// Stamp a payload with the current time.
    #[must_use]
    pub fn new(payload: EventPayload) -> Self {
        Self::at(payload, Utc::now())
    }

    /// Stamp a payload with an explicit time.
    #[must_use]
    pub const fn at(payload: EventPayload, generated_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            generated_at,
        }
    }

    /// Create a game update event.
    #[must_use]
    pub fn game(update: GameUpdate) -> Self {
        Self::new(EventPayload::Game(update))
    }

    /// Create an injury update event.
    #[must_use]
    pub fn injury(update: InjuryUpdate) -> Self {
        Self::new(EventPayload::Injury(update))
    }

    /// Create a betting alert event.
    #[must_use]
    pub fn betting(alert: BettingAlert) -> Self {
        Self::new(EventPayload::Betting(alert))
    }

    /// Event payload.
    #[must_use]
    pub const fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// When the event was generated.
    #[must_use]
    pub const fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// Game-scoped events go to subscribers only, everything else to all.
    #[must_use]
    pub fn delivery(&self) -> Delivery<'_> {
        match &self.payload {
            EventPayload::Game(update) => Delivery::Filtered {
                kind: SubscriptionKind::Games,
                key: &update.game_id,
            },
            EventPayload::Injury(_) | EventPayload::Betting(_) => Delivery::All,
        }
    }

    /// Short event type label for logs and metrics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self.payload {
            EventPayload::Game(_) => "game_update",
            EventPayload::Injury(_) => "injury_update",
            EventPayload::Betting(_) => "betting_alert",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
