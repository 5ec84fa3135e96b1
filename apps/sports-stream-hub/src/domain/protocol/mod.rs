//! Client and Feed Protocol
//!
//! JSON message shapes for the client WebSocket protocol and the upstream
//! event feed, plus the codec that moves between text frames and typed
//! messages.

pub mod codec;
pub mod messages;

pub use codec::{CodecError, JsonCodec};
pub use messages::{
    BettingAlertData, FeedGameData, FeedMessage, GameUpdateData, INBOUND_TYPES, InboundMessage,
    InjuryUpdateData, OutboundMessage,
};
