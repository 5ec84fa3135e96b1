//! Port Interfaces
//!
//! Defines the interfaces (ports) between the hub and its producers
//! following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Transport` (in `domain::connection`): per-connection frame sink
//!
//! ## Driver Ports (Inbound)
//!
//! - `EventSink`: what event producers publish into
//! - `EventSource`: a cancellable producer of sports events
//!
//! A synthetic generator and a live upstream feed both implement
//! `EventSource` against the same `EventSink`, so they can be swapped
//! without touching the broadcaster, registry or subscription store.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::connection::DeliveryReport;
use crate::domain::events::SportsEvent;

/// Destination for produced events.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    /// Deliver an event to every interested connection.
    fn publish(&self, event: &SportsEvent) -> DeliveryReport;
}

/// Errors that stop an event source.
#[derive(Debug, thiserror::Error)]
pub enum EventSourceError {
    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,

    /// Source-specific failure.
    #[error("event source failed: {0}")]
    Failed(String),
}

/// A producer of sports events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Produce events into `sink` until `cancel` fires.
    ///
    /// Events must be built before calling into the sink so that no lock
    /// is held while constructing them.
    ///
    /// # Errors
    ///
    /// Returns an error if the source gives up.
    async fn run(
        &self,
        sink: Arc<dyn EventSink>,
        cancel: CancellationToken,
    ) -> Result<(), EventSourceError>;
}
