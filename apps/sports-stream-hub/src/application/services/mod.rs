//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `Hub`: shared registry + subscription state, stats and shutdown
//! - `Broadcaster`: unicast, broadcast and subscription-filtered delivery
//! - `MessageRouter`: decodes and applies client commands

pub mod broadcaster;
pub mod hub;
pub mod router;

pub use broadcaster::Broadcaster;
pub use hub::{Hub, HubError, HubState, HubStats, Registration};
pub use router::{MessageRouter, Origin, RouteOutcome};
