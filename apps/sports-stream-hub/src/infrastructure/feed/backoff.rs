//! Reconnection Backoff
//!
//! Exponential backoff with jitter between upstream connection attempts.
//! The delay for attempt `n` is `initial * multiplier^n`, capped at `max`,
//! then spread by a random jitter.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::FeedSettings;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound on any delay before jitter.
    pub max: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = +/-10%).
    pub jitter: f64,
    /// Attempts allowed before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::from_settings(&FeedSettings::default())
    }
}

impl BackoffConfig {
    /// Build from feed settings with 10% jitter.
    #[must_use]
    pub const fn from_settings(settings: &FeedSettings) -> Self {
        Self {
            initial: settings.reconnect_delay_initial,
            max: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter: 0.1,
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Attempt counter that hands out retry delays.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use sports_stream_hub::infrastructure::feed::backoff::{Backoff, BackoffConfig};
///
/// let mut backoff = Backoff::new(BackoffConfig {
///     jitter: 0.0,
///     ..BackoffConfig::default()
/// });
///
/// assert_eq!(backoff.next_delay(), Some(Duration::from_millis(500)));
/// assert_eq!(backoff.next_delay(), Some(Duration::from_secs(1)));
///
/// backoff.reset();
/// assert_eq!(backoff.attempts(), 0);
/// ```
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempts: u32,
}

impl Backoff {
    /// Start counting from zero.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }

        let base = self.base_delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        Some(self.jittered(base))
    }

    /// Forget past failures after a successful connection.
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts handed out since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the attempt budget is used up.
    #[must_use]
    pub const fn exhausted(&self) -> bool {
        self.config.max_attempts > 0 && self.attempts >= self.config.max_attempts
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.config.multiplier.max(1.0).powi(exponent);

        #[allow(clippy::cast_precision_loss)]
        let (initial_ms, max_ms) = (
            self.config.initial.as_millis() as f64,
            self.config.max.as_millis() as f64,
        );
        let millis = (initial_ms * factor).round();

        if millis.is_finite() && millis < max_ms {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let millis = millis as u64;
            Duration::from_millis(millis)
        } else {
            self.config.max
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter <= 0.0 {
            return delay;
        }

        #[allow(clippy::cast_precision_loss)]
        let base = delay.as_millis() as f64;
        let spread = base * self.config.jitter;
        let offset: f64 = rand::rng().random_range(-spread..=spread);
        let millis = (base + offset).round().max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = millis as u64;
        Duration::from_millis(millis)
    }
}
