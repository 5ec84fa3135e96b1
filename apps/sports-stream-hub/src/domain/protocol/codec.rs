//! JSON Codec
//!
//! Decodes client commands and upstream feed frames, and encodes outbound
//! messages into shareable frames.
//!
//! Client frames are classified in two steps so the router can tell a
//! malformed frame from a well-formed one with an unknown `type`: first the
//! text must parse as a JSON object with a string `type`, then the tag is
//! checked against the known commands before the body is decoded.

use std::sync::Arc;

use super::messages::{FeedMessage, INBOUND_TYPES, InboundMessage, OutboundMessage};
use crate::domain::connection::Frame;
use crate::domain::events::SportsEvent;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Well-formed message with an unrecognized `type`.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

impl CodecError {
    /// Whether the frame was structurally valid but of an unknown type.
    #[must_use]
    pub const fn is_unknown_type(&self) -> bool {
        matches!(self, Self::UnknownMessageType(_))
    }
}

/// JSON codec for the client protocol and the upstream feed.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one client text frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownMessageType`] for a valid object with an
    /// unrecognized `type`, and `Json`/`InvalidFormat` for anything else
    /// that cannot be decoded.
    pub fn decode_inbound(&self, text: &str) -> Result<InboundMessage, CodecError> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        let Some(object) = value.as_object() else {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}",
                preview(text)
            )));
        };

        let msg_type = object
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CodecError::InvalidFormat("missing string field `type`".to_string()))?;

        if !INBOUND_TYPES.contains(&msg_type) {
            return Err(CodecError::UnknownMessageType(msg_type.to_string()));
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Decode an upstream feed frame into events.
    ///
    /// The feed sends either a single event object or an array of them.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON parsing fails or an element is not a
    /// known event shape.
    pub fn decode_feed(&self, text: &str) -> Result<Vec<SportsEvent>, CodecError> {
        let trimmed = text.trim();

        if trimmed.starts_with('[') {
            let messages: Vec<FeedMessage> = serde_json::from_str(trimmed)?;
            Ok(messages.into_iter().map(FeedMessage::into_event).collect())
        } else if trimmed.starts_with('{') {
            let message: FeedMessage = serde_json::from_str(trimmed)?;
            Ok(vec![message.into_event()])
        } else {
            Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {}",
                preview(trimmed)
            )))
        }
    }

    /// Encode an outbound message into a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode(&self, message: &OutboundMessage) -> Result<Frame, CodecError> {
        let json = serde_json::to_string(message)?;
        Ok(Arc::from(json))
    }
}

fn preview(text: &str) -> &str {
    let end = text
        .char_indices()
        .nth(50)
        .map_or(text.len(), |(index, _)| index);
    &text[..end]
}
