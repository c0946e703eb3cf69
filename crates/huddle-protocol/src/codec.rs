//! Codec for encoding and decoding Huddle events.
//!
//! Events are JSON text, one envelope per WebSocket text frame. The
//! transport already delimits messages, so no length prefix is needed.

use thiserror::Error;

use crate::events::{ClientEvent, ServerEvent};

/// Maximum encoded event size (64 KiB).
pub const MAX_EVENT_BYTES: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Event exceeds maximum size.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_BYTES}")]
    EventTooLarge(usize),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode a server event as a JSON text frame.
///
/// # Errors
///
/// Returns an error if the event is too large or serialization fails.
pub fn encode(event: &ServerEvent) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(event).map_err(ProtocolError::Encode)?;

    if text.len() > MAX_EVENT_BYTES {
        return Err(ProtocolError::EventTooLarge(text.len()));
    }

    Ok(text)
}

/// Decode a client event from a JSON text frame.
///
/// # Errors
///
/// Returns an error if the text is too large, is not valid JSON, names an
/// unknown event, or is missing a required field.
pub fn decode(text: &str) -> Result<ClientEvent, ProtocolError> {
    if text.len() > MAX_EVENT_BYTES {
        return Err(ProtocolError::EventTooLarge(text.len()));
    }

    serde_json::from_str(text).map_err(ProtocolError::Decode)
}
