//! Event types exchanged between clients and the gateway.
//!
//! Messages themselves are not sent over the socket by clients; the REST
//! mutation path owns message creation and calls into the gateway after its
//! commit. The socket vocabulary covers room membership, typing, read
//! acknowledgements, and server pushes.

use courier_store::{Message, Notification};
use serde::{Deserialize, Serialize};

/// Error codes carried by [`ServerEvent::Error`].
///
/// The 4xxx range mirrors WebSocket application close codes.
pub mod codes {
    /// The frame could not be decoded.
    pub const MALFORMED: u16 = 4000;
    /// Handshake credential missing, invalid, or expired.
    pub const UNAUTHENTICATED: u16 = 4001;
    /// The authenticated user is not allowed to perform the operation.
    pub const FORBIDDEN: u16 = 4003;
    /// The referenced entity does not exist.
    pub const NOT_FOUND: u16 = 4004;
    /// The persisted store could not be reached.
    pub const UNAVAILABLE: u16 = 4005;
    /// A per-connection limit was exceeded.
    pub const LIMIT_EXCEEDED: u16 = 4006;
}

/// Events a client sends to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Handshake credential, for clients that cannot set a query parameter.
    Connect {
        /// Bearer token.
        token: String,
    },

    /// Join a conversation room. Requires participant membership.
    JoinConversation {
        /// Conversation to join.
        conversation_id: String,
    },

    /// Leave a conversation room.
    LeaveConversation {
        /// Conversation to leave.
        conversation_id: String,
    },

    /// The sender started composing a message.
    TypingStart {
        /// Conversation being typed in.
        conversation_id: String,
        /// User whose devices should see the indicator.
        receiver_id: String,
    },

    /// The sender stopped composing.
    TypingStop {
        /// Conversation being typed in.
        conversation_id: String,
        /// User whose devices should see the indicator.
        receiver_id: String,
    },

    /// The reader has read a message.
    MessageRead {
        /// Message that was read.
        message_id: String,
        /// Conversation the message belongs to.
        conversation_id: String,
    },

    /// Acknowledge a notification. No relay follows.
    NotificationRead {
        /// Notification that was seen.
        notification_id: String,
    },
}

/// Events the gateway emits to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Handshake accepted; the connection is bound to a user.
    Connected {
        /// Server-assigned connection identifier.
        connection_id: String,
        /// The authenticated user.
        user_id: String,
        /// Recommended client heartbeat interval in milliseconds.
        heartbeat_ms: u64,
    },

    /// A chat message was persisted and is being relayed.
    NewMessage {
        /// The canonical message as returned by the store.
        message: Message,
    },

    /// A user started or stopped typing in a conversation.
    UserTyping {
        /// Conversation being typed in.
        conversation_id: String,
        /// The typist.
        user_id: String,
        /// Whether typing is in progress.
        is_typing: bool,
    },

    /// A message the recipient sent was read.
    MessageReadReceipt {
        /// Message that was read.
        message_id: String,
        /// Conversation the message belongs to.
        conversation_id: String,
        /// Persisted read timestamp in epoch milliseconds.
        read_at: u64,
    },

    /// A product notification (like, comment, connection request, job match).
    Notification {
        /// The transient payload.
        notification: Notification,
    },

    /// An operation failed. The connection stays open unless the error is
    /// handshake-level.
    Error {
        /// One of [`codes`].
        code: u16,
        /// Human-readable description.
        message: String,
    },
}

impl ServerEvent {
    /// Create a `Connected` event.
    #[must_use]
    pub fn connected(
        connection_id: impl Into<String>,
        user_id: impl Into<String>,
        heartbeat_ms: u64,
    ) -> Self {
        ServerEvent::Connected {
            connection_id: connection_id.into(),
            user_id: user_id.into(),
            heartbeat_ms,
        }
    }

    /// Create a `NewMessage` event.
    #[must_use]
    pub fn new_message(message: Message) -> Self {
        ServerEvent::NewMessage { message }
    }

    /// Create a `UserTyping` event.
    #[must_use]
    pub fn user_typing(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        is_typing: bool,
    ) -> Self {
        ServerEvent::UserTyping {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            is_typing,
        }
    }

    /// Create a `MessageReadReceipt` event.
    #[must_use]
    pub fn message_read_receipt(
        message_id: impl Into<String>,
        conversation_id: impl Into<String>,
        read_at: u64,
    ) -> Self {
        ServerEvent::MessageReadReceipt {
            message_id: message_id.into(),
            conversation_id: conversation_id.into(),
            read_at,
        }
    }

    /// Create a `Notification` event.
    #[must_use]
    pub fn notification(notification: Notification) -> Self {
        ServerEvent::Notification { notification }
    }

    /// Create an `Error` event.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_names() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"typing_start","conversation_id":"c1","receiver_id":"b"}"#)
                .unwrap();
        assert_eq!(
            event,
            ClientEvent::TypingStart {
                conversation_id: "c1".into(),
                receiver_id: "b".into(),
            }
        );

        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"message_read","message_id":"m1","conversation_id":"c1"}"#)
                .unwrap();
        assert!(matches!(event, ClientEvent::MessageRead { .. }));
    }

    #[test]
    fn test_unknown_event_type_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_str(r#"{"type":"send_message","content":"hi"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_user_typing_shape() {
        let event = ServerEvent::user_typing("c1", "a", true);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user_typing");
        assert_eq!(json["conversation_id"], "c1");
        assert_eq!(json["user_id"], "a");
        assert_eq!(json["is_typing"], true);
    }

    #[test]
    fn test_notification_keeps_inner_type_field() {
        let event = ServerEvent::notification(
            courier_store::Notification::new("comment", "New comment", "on your post"),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "notification");
        assert_eq!(json["notification"]["type"], "comment");
    }
}
