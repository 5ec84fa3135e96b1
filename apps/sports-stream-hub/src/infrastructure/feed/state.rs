//! Feed Status Tracking
//!
//! Shared, lock-light status of the running event source, read by the
//! health server while the source updates it.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Lifecycle of an event source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    /// Not started, or no source configured.
    Idle,
    /// Opening the upstream connection.
    Connecting,
    /// Producing events.
    Running,
    /// Waiting before the next connection attempt.
    Reconnecting,
    /// Gave up after an unrecoverable error.
    Error,
    /// Stopped by shutdown.
    Stopped,
}

impl FeedStatus {
    /// Whether the hub should report ready with the source in this state.
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        !matches!(self, Self::Error)
    }
}

/// Point-in-time view of a [`FeedState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    /// Source name.
    pub source: &'static str,
    /// Current status.
    pub status: FeedStatus,
    /// Events published so far.
    pub events_emitted: u64,
    /// Consecutive failed connection attempts.
    pub reconnect_attempts: u32,
    /// Last time the source reached `Running`.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Last error, cleared on successful connect.
    pub last_error: Option<String>,
}

/// Status of the event source shared with the health server.
#[derive(Debug)]
pub struct FeedState {
    source: &'static str,
    status: RwLock<FeedStatus>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    events_emitted: AtomicU64,
}

impl FeedState {
    /// Create idle state for a named source.
    #[must_use]
    pub const fn new(source: &'static str) -> Self {
        Self {
            source,
            status: RwLock::new(FeedStatus::Idle),
            last_connected_at: RwLock::new(None),
            last_error: RwLock::new(None),
            reconnect_attempts: AtomicU32::new(0),
            events_emitted: AtomicU64::new(0),
        }
    }

    /// Source name.
    #[must_use]
    pub const fn source(&self) -> &'static str {
        self.source
    }

    /// Set the status. Reaching `Running` resets the failure bookkeeping.
    pub fn set_status(&self, status: FeedStatus) {
        *self.status.write() = status;
        if status == FeedStatus::Running {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.last_error.write() = None;
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// Record an error without changing the status.
    pub fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write() = Some(message.into());
    }

    /// Enter the terminal error state.
    pub fn fail(&self, message: impl Into<String>) {
        self.record_error(message);
        *self.status.write() = FeedStatus::Error;
    }

    /// Record a reconnection attempt.
    pub fn record_reconnect(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        *self.status.write() = FeedStatus::Reconnecting;
    }

    /// Record a published event.
    pub fn record_event(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> FeedStatus {
        *self.status.read()
    }

    /// Events published so far.
    #[must_use]
    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }

    /// Consistent-enough copy for reporting.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            source: self.source,
            status: self.status(),
            events_emitted: self.events_emitted(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let state = FeedState::new("synthetic");
        let snapshot = state.snapshot();
        assert_eq!(snapshot.source, "synthetic");
        assert_eq!(snapshot.status, FeedStatus::Idle);
        assert_eq!(snapshot.events_emitted, 0);
        assert!(snapshot.last_connected_at.is_none());
    }

    #[test]
    fn running_clears_failures() {
        let state = FeedState::new("upstream");
        state.record_error("connection refused");
        state.record_reconnect();
        state.record_reconnect();
        assert_eq!(state.snapshot().reconnect_attempts, 2);
        assert_eq!(state.status(), FeedStatus::Reconnecting);

        state.set_status(FeedStatus::Running);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.reconnect_attempts, 0);
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.last_connected_at.is_some());
    }

    #[test]
    fn fail_is_unhealthy() {
        let state = FeedState::new("upstream");
        state.fail("maximum reconnection attempts exceeded");

        assert_eq!(state.status(), FeedStatus::Error);
        assert!(!state.status().is_healthy());
        assert!(FeedStatus::Stopped.is_healthy());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let state = FeedState::new("synthetic");
        state.record_event();

        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["eventsEmitted"], 1);
        assert_eq!(json["status"], "idle");
    }
}
