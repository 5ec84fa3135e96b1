//! Domain Layer - Core hub types and business logic.
//!
//! This layer contains the core domain types for connection tracking,
//! subscriptions, sports events and the wire protocol. Types here carry
//! no runtime dependencies beyond serialization support.

/// Client connections, lifecycle state machine and the connection registry.
pub mod connection;

/// Sports event types (game updates, injuries, betting alerts).
pub mod events;

/// Client/feed message shapes and the JSON codec.
pub mod protocol;

/// Per-client subscription tracking.
pub mod subscription;
