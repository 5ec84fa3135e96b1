//! Upstream Heartbeat
//!
//! Liveness tracking for the upstream feed connection. The connection loop
//! calls [`Heartbeat::on_tick`] on every ping interval and
//! [`Heartbeat::record_activity`] whenever the upstream sends anything.
//! Any inbound frame counts as proof of life, not only pongs.

use std::time::{Duration, Instant};

use crate::infrastructure::config::FeedSettings;

/// Heartbeat timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between pings.
    pub ping_interval: Duration,
    /// Silence after a ping before the connection is considered dead.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self::from_settings(&FeedSettings::default())
    }
}

impl HeartbeatConfig {
    /// Build from feed settings.
    #[must_use]
    pub const fn from_settings(settings: &FeedSettings) -> Self {
        Self {
            ping_interval: settings.heartbeat_interval,
            pong_timeout: settings.heartbeat_timeout,
        }
    }
}

/// What the connection loop should do on a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a ping.
    SendPing,
    /// The upstream went silent; drop the connection.
    TimedOut {
        /// Time since the upstream was last heard from.
        silent_for: Duration,
    },
}

/// Per-connection heartbeat bookkeeping.
#[derive(Debug)]
pub struct Heartbeat {
    config: HeartbeatConfig,
    last_seen: Instant,
    ping_outstanding: bool,
}

impl Heartbeat {
    /// Start tracking a freshly opened connection.
    #[must_use]
    pub fn new(config: HeartbeatConfig) -> Self {
        Self::started_at(config, Instant::now())
    }

    /// Start tracking as of `now`.
    #[must_use]
    pub const fn started_at(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            config,
            last_seen: now,
            ping_outstanding: false,
        }
    }

    /// Configured ping interval.
    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        self.config.ping_interval
    }

    /// The upstream sent something.
    pub fn record_activity(&mut self) {
        self.record_activity_at(Instant::now());
    }

    /// The upstream sent something at `now`.
    pub const fn record_activity_at(&mut self, now: Instant) {
        self.last_seen = now;
        self.ping_outstanding = false;
    }

    /// Whether a ping is awaiting an answer.
    #[must_use]
    pub const fn ping_outstanding(&self) -> bool {
        self.ping_outstanding
    }

    /// Decide what to do on a tick.
    pub fn on_tick(&mut self) -> HeartbeatAction {
        self.on_tick_at(Instant::now())
    }

    /// Decide what to do on a tick at `now`.
    pub fn on_tick_at(&mut self, now: Instant) -> HeartbeatAction {
        let silent_for = now.saturating_duration_since(self.last_seen);

        if self.ping_outstanding && silent_for > self.config.pong_timeout {
            return HeartbeatAction::TimedOut { silent_for };
        }

        self.ping_outstanding = true;
        HeartbeatAction::SendPing
    }
}
