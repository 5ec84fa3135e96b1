//! Synthetic Event Source
//!
//! Generates plausible game, injury and betting events on a fixed interval
//! so the hub can run without an upstream feed.
//!
//! Each tick produces one `GAME_UPDATE` for a random configured game, plus
//! an `INJURY_UPDATE` with probability 0.3 and a `BETTING_ALERT` with
//! probability 0.2. Events are built before anything is published.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use rand::seq::IndexedRandom;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::emit;
use super::state::{FeedState, FeedStatus};
use crate::application::ports::{EventSink, EventSource, EventSourceError};
use crate::domain::events::{
    BettingAlert, BettingAlertKind, GameStatus, GameUpdate, InjuryImpact, InjuryUpdate, Score,
    SportsEvent,
};
use crate::infrastructure::config::SyntheticSettings;

/// Probability of an injury update per tick.
pub const INJURY_PROBABILITY: f64 = 0.3;

/// Probability of a betting alert per tick.
pub const BETTING_PROBABILITY: f64 = 0.2;

const PLAYERS: &[(&str, &str)] = &[
    ("P1", "Marcus Hill"),
    ("P2", "Devon Carter"),
    ("P3", "Luis Ortega"),
    ("P4", "Jamal Brooks"),
    ("P5", "Tyler Quinn"),
];

const TEAMS: &[&str] = &["Hawks", "Wolves", "Bears", "Sharks"];

const INJURIES: &[&str] = &["Ankle sprain", "Hamstring", "Concussion", "Knee", "Shoulder"];

const INJURY_STATUSES: &[&str] = &["QUESTIONABLE", "DOUBTFUL", "OUT"];

const KEY_PLAYS: &[&str] = &[
    "Touchdown pass",
    "Interception",
    "Field goal",
    "Fumble recovery",
    "Sack on third down",
    "Two-point conversion",
];

const ALERT_KINDS: &[BettingAlertKind] = &[
    BettingAlertKind::LineMovement,
    BettingAlertKind::SharpAction,
    BettingAlertKind::ValueBet,
    BettingAlertKind::PropAlert,
];

const IMPACTS: &[InjuryImpact] = &[InjuryImpact::Low, InjuryImpact::Medium, InjuryImpact::High];

/// Fixed-interval generator of sports events.
#[derive(Debug)]
pub struct SyntheticEventSource {
    settings: SyntheticSettings,
    state: Arc<FeedState>,
}

impl SyntheticEventSource {
    /// Create a generator reporting through `state`.
    #[must_use]
    pub const fn new(settings: SyntheticSettings, state: Arc<FeedState>) -> Self {
        Self { settings, state }
    }

    /// Events for one tick.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<SportsEvent> {
        let mut events = Vec::with_capacity(3);

        if let Some(game_id) = self.settings.games.choose(rng) {
            events.push(SportsEvent::game(game_update(rng, game_id)));
        }

        if rng.random_bool(INJURY_PROBABILITY) {
            events.push(SportsEvent::injury(injury_update(rng)));
        }

        if rng.random_bool(BETTING_PROBABILITY) {
            let game = self
                .settings
                .games
                .choose(rng)
                .map_or("G1", String::as_str);
            events.push(SportsEvent::betting(betting_alert(rng, game)));
        }

        events
    }

    fn tick(&self, sink: &dyn EventSink) {
        // ThreadRng is not Send, keep it out of the async state
        let events = self.generate(&mut rand::rng());

        for event in &events {
            emit(sink, &self.state, event);
        }
    }
}

#[async_trait]
impl EventSource for SyntheticEventSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn run(
        &self,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Result<(), EventSourceError> {
        let period = self.settings.interval;
        if period.is_zero() {
            let err = EventSourceError::Failed("synthetic interval must be positive".to_string());
            tracing::error!(error = %err, "Synthetic event source not started");
            self.state.fail(err.to_string());
            return Err(err);
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.state.set_status(FeedStatus::Running);
        tracing::info!(
            interval_secs = period.as_secs(),
            games = self.settings.games.len(),
            "Synthetic event source started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => self.tick(sink.as_ref()),
            }
        }

        self.state.set_status(FeedStatus::Stopped);
        tracing::info!(
            events_emitted = self.state.events_emitted(),
            "Synthetic event source stopped"
        );
        Ok(())
    }
}

fn pick<T: Copy, R: Rng + ?Sized>(rng: &mut R, items: &[T]) -> T {
    items[rng.random_range(0..items.len())]
}

fn game_update<R: Rng + ?Sized>(rng: &mut R, game_id: &str) -> GameUpdate {
    let quarter = rng.random_range(1..=4u8);
    let status = if quarter == 2 && rng.random_bool(0.15) {
        GameStatus::Halftime
    } else {
        GameStatus::InProgress
    };

    let key_plays = (0..rng.random_range(0..=2))
        .map(|_| pick(rng, KEY_PLAYS).to_string())
        .collect();

    let (player_id, _) = pick(rng, PLAYERS);
    let mut player_updates = BTreeMap::new();
    player_updates.insert(
        player_id.to_string(),
        serde_json::json!({
            "yards": rng.random_range(0..=180),
            "touchdowns": rng.random_range(0..=3),
        }),
    );

    GameUpdate {
        game_id: game_id.to_string(),
        score: Score {
            home: rng.random_range(0..=42),
            away: rng.random_range(0..=42),
        },
        status,
        time: format!(
            "Q{quarter} {:02}:{:02}",
            rng.random_range(0..15),
            rng.random_range(0..60)
        ),
        key_plays,
        player_updates,
    }
}

fn injury_update<R: Rng + ?Sized>(rng: &mut R) -> InjuryUpdate {
    let (_, player) = pick(rng, PLAYERS);
    InjuryUpdate {
        player: player.to_string(),
        team: pick(rng, TEAMS).to_string(),
        injury: pick(rng, INJURIES).to_string(),
        status: pick(rng, INJURY_STATUSES).to_string(),
        impact: pick(rng, IMPACTS),
    }
}

fn betting_alert<R: Rng + ?Sized>(rng: &mut R, game: &str) -> BettingAlert {
    let kind = pick(rng, ALERT_KINDS);
    let description = match kind {
        BettingAlertKind::LineMovement => format!(
            "Spread moved {:.1} points in the last hour",
            f64::from(rng.random_range(1..=6u8)) / 2.0
        ),
        BettingAlertKind::SharpAction => "Sharp money hitting the underdog".to_string(),
        BettingAlertKind::ValueBet => "Model edge on the home moneyline".to_string(),
        BettingAlertKind::PropAlert => {
            let (_, player) = pick(rng, PLAYERS);
            format!("{player} receiving yards prop trending over")
        }
    };

    BettingAlert {
        kind,
        game: game.to_string(),
        description,
        confidence: rng.random_range(50..=95),
    }
}
