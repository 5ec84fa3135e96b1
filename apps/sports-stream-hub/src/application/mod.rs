//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with transports and producers.

/// Port interfaces for event producers and sinks.
pub mod ports;

/// Hub, broadcaster and message router services.
pub mod services;
