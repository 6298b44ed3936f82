//! JSON codec for wire events.
//!
//! Frames are single JSON text messages; there is no length prefix because
//! the WebSocket layer already delimits messages.

use thiserror::Error;

use crate::events::{ClientEvent, ServerEvent};

/// Maximum accepted inbound frame size (64 KiB).
pub const MAX_EVENT_BYTES: usize = 64 * 1024;

/// Errors that can occur while encoding or decoding events.
#[derive(Debug, Error)]
pub enum EventError {
    /// Frame exceeds maximum size.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_BYTES}")]
    TooLarge(usize),

    /// The frame is not a valid event.
    #[error("Malformed event: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encode a server event to a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(event: &ServerEvent) -> Result<String, EventError> {
    Ok(serde_json::to_string(event)?)
}

/// Decode a client event from a JSON text frame.
///
/// # Errors
///
/// Returns an error if the frame is oversized or not a known event.
pub fn decode(text: &str) -> Result<ClientEvent, EventError> {
    if text.len() > MAX_EVENT_BYTES {
        return Err(EventError::TooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::codes;

    #[test]
    fn test_decode_join() {
        let event = decode(r#"{"type":"join_conversation","conversation_id":"c7"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinConversation {
                conversation_id: "c7".into()
            }
        );
    }

    #[test]
    fn test_decode_rejects_oversized() {
        let padding = "x".repeat(MAX_EVENT_BYTES);
        let frame = format!(r#"{{"type":"connect","token":"{padding}"}}"#);
        assert!(matches!(decode(&frame), Err(EventError::TooLarge(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode("not json at all"),
            Err(EventError::Malformed(_))
        ));
    }

    #[test]
    fn test_encode_error_event() {
        let frame = encode(&ServerEvent::error(codes::FORBIDDEN, "not a participant")).unwrap();
        assert!(frame.contains(r#""type":"error""#));
        assert!(frame.contains("4003"));
    }
}
