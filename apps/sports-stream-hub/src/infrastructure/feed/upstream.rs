//! Upstream Feed Source
//!
//! Consumes a live event feed over WebSocket and republishes every decoded
//! event through the hub.
//!
//! # Protocol
//!
//! Text frames carry either one event object or a JSON array of them, in
//! the same shapes clients receive (`GAME_UPDATE`, `INJURY_UPDATE`,
//! `BETTING_ALERT`) minus `timestamp`. Events are stamped on receipt.
//! Undecodable frames are logged and skipped.
//!
//! # Connection Lifecycle
//!
//! The source pings the upstream on the heartbeat interval and drops the
//! connection when it stays silent past the timeout. Any failure leads to
//! a reconnect after an exponential backoff delay; a successful connect
//! resets the backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::backoff::{Backoff, BackoffConfig};
use super::emit;
use super::heartbeat::{Heartbeat, HeartbeatAction, HeartbeatConfig};
use super::state::{FeedState, FeedStatus};
use crate::application::ports::{EventSink, EventSource, EventSourceError};
use crate::domain::protocol::JsonCodec;
use crate::infrastructure::config::FeedSettings;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Reasons a single upstream connection ended.
#[derive(Debug, thiserror::Error)]
pub enum FeedConnectionError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The upstream closed the connection.
    #[error("connection closed by upstream")]
    Closed,

    /// The upstream stopped answering pings.
    #[error("heartbeat timeout after {0:?}")]
    HeartbeatTimeout(Duration),
}

// =============================================================================
// Upstream Feed Source
// =============================================================================

/// Event source backed by an upstream WebSocket feed.
#[derive(Debug)]
pub struct UpstreamFeedSource {
    url: String,
    backoff: BackoffConfig,
    heartbeat: HeartbeatConfig,
    state: Arc<FeedState>,
    codec: JsonCodec,
}

impl UpstreamFeedSource {
    /// Create a source for `url`, reporting through `state`.
    #[must_use]
    pub fn new(url: impl Into<String>, settings: &FeedSettings, state: Arc<FeedState>) -> Self {
        Self {
            url: url.into(),
            backoff: BackoffConfig::from_settings(settings),
            heartbeat: HeartbeatConfig::from_settings(settings),
            state,
            codec: JsonCodec::new(),
        }
    }

    /// Upstream URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connect once and stream until cancelled or the connection fails.
    ///
    /// Returns `Ok(())` only on cancellation.
    async fn connect_and_stream(
        &self,
        sink: &dyn EventSink,
        cancel: &CancellationToken,
        backoff: &mut Backoff,
    ) -> Result<(), FeedConnectionError> {
        tracing::info!(url = %self.url, "Connecting to upstream feed");

        let connect = tokio_tungstenite::connect_async(self.url.as_str());
        let (ws_stream, _response) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            result = connect => result?,
        };

        self.state.set_status(FeedStatus::Running);
        backoff.reset();
        tracing::info!(url = %self.url, "Upstream feed connected");

        let (mut write, mut read) = ws_stream.split();

        let mut heartbeat = Heartbeat::new(self.heartbeat);
        let period = heartbeat.ping_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match heartbeat.on_tick() {
                        HeartbeatAction::SendPing => {
                            write.send(Message::Ping(Vec::new().into())).await?;
                        }
                        HeartbeatAction::TimedOut { silent_for } => {
                            return Err(FeedConnectionError::HeartbeatTimeout(silent_for));
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat.record_activity();
                            self.handle_text(sink, text.as_str());
                        }
                        Some(Ok(Message::Ping(data))) => {
                            heartbeat.record_activity();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_) | Message::Binary(_))) => {
                            heartbeat.record_activity();
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(FeedConnectionError::Closed);
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }
    }

    fn handle_text(&self, sink: &dyn EventSink, text: &str) {
        match self.codec.decode_feed(text) {
            Ok(events) => {
                for event in &events {
                    emit(sink, &self.state, event);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping undecodable upstream frame");
            }
        }
    }
}

#[async_trait]
impl EventSource for UpstreamFeedSource {
    fn name(&self) -> &'static str {
        "upstream"
    }

    async fn run(
        &self,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Result<(), EventSourceError> {
        if self.heartbeat.ping_interval.is_zero() {
            let err = EventSourceError::Failed("heartbeat interval must be positive".to_string());
            tracing::error!(url = %self.url, error = %err, "Upstream feed source not started");
            self.state.fail(err.to_string());
            return Err(err);
        }

        let mut backoff = Backoff::new(self.backoff.clone());

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.state.set_status(FeedStatus::Connecting);

            match self
                .connect_and_stream(sink.as_ref(), &cancel, &mut backoff)
                .await
            {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "Upstream feed connection lost");
                    self.state.record_error(e.to_string());

                    let Some(delay) = backoff.next_delay() else {
                        let err = EventSourceError::MaxReconnectAttemptsExceeded;
                        tracing::error!(attempts = backoff.attempts(), "Giving up on upstream feed");
                        self.state.fail(err.to_string());
                        return Err(err);
                    };

                    self.state.record_reconnect();
                    metrics::record_feed_reconnect(self.name());
                    tracing::info!(
                        attempt = backoff.attempts(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Reconnecting to upstream feed"
                    );

                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.state.set_status(FeedStatus::Stopped);
        tracing::info!(
            events_emitted = self.state.events_emitted(),
            "Upstream feed source stopped"
        );
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
