//! Wire Message Types
//!
//! JSON shapes exchanged with clients and with the upstream event feed.
//! Every message is an object tagged by a `type` field.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::events::{
    BettingAlert, EventPayload, GameStatus, GameUpdate, InjuryUpdate, Score, SportsEvent,
};

// =============================================================================
// Inbound (client -> server)
// =============================================================================

/// `type` tags the router understands.
pub const INBOUND_TYPES: &[&str] = &[
    "SUBSCRIBE_GAMES",
    "UNSUBSCRIBE_GAMES",
    "SUBSCRIBE_PLAYERS",
    "PING",
];

/// A recognized client command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum InboundMessage {
    /// Follow the given games.
    SubscribeGames {
        /// Game identifiers.
        #[serde(deserialize_with = "entity_ids")]
        game_ids: Vec<String>,
    },
    /// Stop following the given games.
    UnsubscribeGames {
        /// Game identifiers.
        #[serde(deserialize_with = "entity_ids")]
        game_ids: Vec<String>,
    },
    /// Follow the given players.
    SubscribePlayers {
        /// Player identifiers.
        #[serde(deserialize_with = "entity_ids")]
        player_ids: Vec<String>,
    },
    /// Liveness check; answered with `PONG`.
    Ping,
}

impl InboundMessage {
    /// Tag name for logs and metrics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::SubscribeGames { .. } => "subscribe_games",
            Self::UnsubscribeGames { .. } => "unsubscribe_games",
            Self::SubscribePlayers { .. } => "subscribe_players",
            Self::Ping => "ping",
        }
    }
}

/// Identifiers arrive as strings, but clients often send numeric ids.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntityId {
    Text(String),
    Number(serde_json::Number),
}

fn entity_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<RawEntityId>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|id| match id {
            RawEntityId::Text(text) => text,
            RawEntityId::Number(number) => number.to_string(),
        })
        .collect())
}

// =============================================================================
// Outbound (server -> client)
// =============================================================================

/// `data` block of a `GAME_UPDATE`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdateData {
    /// Current score.
    pub score: Score,
    /// Game status.
    pub status: GameStatus,
    /// Game clock.
    pub time: String,
    /// Recent key plays.
    pub key_plays: Vec<String>,
    /// Per-player stat lines.
    pub player_updates: BTreeMap<String, serde_json::Value>,
    /// Generation time of the event.
    pub timestamp: DateTime<Utc>,
}

/// `data` block of an `INJURY_UPDATE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjuryUpdateData {
    /// The injury fields.
    #[serde(flatten)]
    pub update: InjuryUpdate,
    /// Generation time of the event.
    pub timestamp: DateTime<Utc>,
}

/// `data` block of a `BETTING_ALERT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BettingAlertData {
    /// The alert fields.
    #[serde(flatten)]
    pub alert: BettingAlert,
    /// Generation time of the event.
    pub timestamp: DateTime<Utc>,
}

/// A message sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum OutboundMessage {
    /// Greeting sent right after registration.
    Welcome {
        /// The client identifier the connection was registered under.
        user_id: String,
        /// Greeting text.
        message: String,
        /// Feature names the server offers.
        features: Vec<String>,
        /// Send time.
        timestamp: DateTime<Utc>,
    },
    /// Reply to `PING`.
    Pong {
        /// Reply time, never earlier than the ping's receipt.
        timestamp: DateTime<Utc>,
    },
    /// Game update for subscribers of `game_id`.
    GameUpdate {
        /// Game identifier.
        game_id: String,
        /// Update body.
        data: GameUpdateData,
    },
    /// Injury update for everyone.
    InjuryUpdate {
        /// Update body.
        data: InjuryUpdateData,
    },
    /// Betting alert for everyone.
    BettingAlert {
        /// Alert body.
        data: BettingAlertData,
    },
}

impl OutboundMessage {
    /// Build the wire message for an event.
    #[must_use]
    pub fn from_event(event: &SportsEvent) -> Self {
        let timestamp = event.generated_at();

        match event.payload() {
            EventPayload::Game(update) => Self::GameUpdate {
                game_id: update.game_id.clone(),
                data: GameUpdateData {
                    score: update.score,
                    status: update.status,
                    time: update.time.clone(),
                    key_plays: update.key_plays.clone(),
                    player_updates: update.player_updates.clone(),
                    timestamp,
                },
            },
            EventPayload::Injury(update) => Self::InjuryUpdate {
                data: InjuryUpdateData {
                    update: update.clone(),
                    timestamp,
                },
            },
            EventPayload::Betting(alert) => Self::BettingAlert {
                data: BettingAlertData {
                    alert: alert.clone(),
                    timestamp,
                },
            },
        }
    }

    /// Tag name for logs and metrics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::Pong { .. } => "pong",
            Self::GameUpdate { .. } => "game_update",
            Self::InjuryUpdate { .. } => "injury_update",
            Self::BettingAlert { .. } => "betting_alert",
        }
    }
}

// =============================================================================
// Upstream Feed
// =============================================================================

/// Game fields as published by the upstream feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedGameData {
    /// Current score.
    pub score: Score,
    /// Game status.
    pub status: GameStatus,
    /// Game clock.
    #[serde(default)]
    pub time: String,
    /// Recent key plays.
    #[serde(default)]
    pub key_plays: Vec<String>,
    /// Per-player stat lines.
    #[serde(default)]
    pub player_updates: BTreeMap<String, serde_json::Value>,
}

/// One event published by the upstream feed.
///
/// Uses the outbound event shapes; any `timestamp` field is ignored since
/// events are stamped when this service emits them.
#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum FeedMessage {
    /// Game update.
    GameUpdate {
        /// Game identifier.
        game_id: String,
        /// Update body.
        data: FeedGameData,
    },
    /// Injury update.
    InjuryUpdate {
        /// Update body.
        data: InjuryUpdate,
    },
    /// Betting alert.
    BettingAlert {
        /// Alert body.
        data: BettingAlert,
    },
}

impl FeedMessage {
    /// Convert into an event stamped with the current time.
    #[must_use]
    pub fn into_event(self) -> SportsEvent {
        match self {
            Self::GameUpdate { game_id, data } => SportsEvent::game(GameUpdate {
                game_id,
                score: data.score,
                status: data.status,
                time: data.time,
                key_plays: data.key_plays,
                player_updates: data.player_updates,
            }),
            Self::InjuryUpdate { data } => SportsEvent::injury(data),
            Self::BettingAlert { data } => SportsEvent::betting(data),
        }
    }
}
