#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Sports Stream Hub - Live Sports Event Fan-out
//!
//! A WebSocket service that keeps one connection per client, tracks which
//! games and players each client follows, and pushes live sports events
//! (game updates, injury reports, betting alerts) to the clients that care.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core hub types with no runtime dependencies
//!   - `connection`: Connections, lifecycle state machine, registry
//!   - `subscription`: Per-client game/player/team subscription sets
//!   - `events`: Sports event payloads and their delivery targeting
//!   - `protocol`: Client and feed wire messages, JSON codec
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `EventSink` and `EventSource` interfaces
//!   - `services`: Hub, broadcaster and client message router
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `websocket`: Client WebSocket server and sessions
//!   - `feed`: Synthetic generator and upstream WebSocket feed
//!   - `config`: Configuration from the environment
//!   - `health`: Health, stats and metrics HTTP endpoint
//!   - `metrics`, `telemetry`: Prometheus and tracing setup
//!
//! # Data Flow
//!
//! ```text
//! Synthetic / upstream feed ──► Broadcaster ──► per-connection queue ──► Client 1
//!                                   │                                ──► Client 2
//!                                   ▼                                ──► Client N
//!                     Hub (registry + subscriptions)
//!                                   ▲
//! Client commands ──► MessageRouter ┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core hub types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{
    ANONYMOUS_CLIENT_ID, ClientId, Connection, ConnectionId, ConnectionRegistry, ConnectionState,
    DeliveryReport, Frame, SendError, Transport,
};
pub use domain::events::{
    BettingAlert, BettingAlertKind, GameStatus, GameUpdate, InjuryImpact, InjuryUpdate, Score,
    SportsEvent,
};
pub use domain::protocol::{CodecError, InboundMessage, JsonCodec, OutboundMessage};
pub use domain::subscription::{
    EntityId, SubscriptionKind, SubscriptionSet, SubscriptionStore, TotalSubscriptionStats,
};

// Application services
pub use application::ports::{EventSink, EventSource, EventSourceError};
pub use application::services::{Broadcaster, Hub, HubError, HubStats, MessageRouter, Origin};

// Infrastructure config
pub use infrastructure::config::{ConfigError, EventSourceKind, HubConfig};

// Event sources
pub use infrastructure::feed::{FeedState, FeedStatus, SyntheticEventSource, UpstreamFeedSource};

// Servers
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::websocket::{ServerError, SessionContext, WsServer};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
