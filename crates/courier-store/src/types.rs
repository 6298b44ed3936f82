//! Canonical data types owned by the external store.
//!
//! Courier never constructs `Message` values itself; it relays the canonical
//! object the store returns after a write.

use serde::{Deserialize, Serialize};

/// A user identifier.
pub type UserId = String;

/// A conversation identifier.
pub type ConversationId = String;

/// A message identifier, assigned by the store on persist.
pub type MessageId = String;

/// A notification identifier.
pub type NotificationId = String;

/// The identity a verified credential resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// The authenticated user.
    pub user_id: UserId,
}

impl UserIdentity {
    /// Create a new identity.
    #[must_use]
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// A user record as held by the external store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    pub display_name: String,
}

/// A chat message as persisted by the external store.
///
/// `id`, `created_at`, and `read_at` are assigned by the store; the relay
/// treats the whole object as opaque and canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier, assigned on persist.
    pub id: MessageId,
    /// Conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Sending user.
    pub sender_id: UserId,
    /// Receiving user.
    pub receiver_id: UserId,
    /// Message body.
    pub content: String,
    /// Persist timestamp in epoch milliseconds.
    pub created_at: u64,
    /// Read timestamp in epoch milliseconds, if the receiver has read it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<u64>,
}

/// The fields Courier supplies when asking the store to persist a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Conversation to append to.
    pub conversation_id: ConversationId,
    /// Sending user.
    pub sender_id: UserId,
    /// Receiving user.
    pub receiver_id: UserId,
    /// Message body.
    pub content: String,
}

impl NewMessage {
    /// Create a new message request.
    #[must_use]
    pub fn new(
        conversation_id: impl Into<ConversationId>,
        sender_id: impl Into<UserId>,
        receiver_id: impl Into<UserId>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content: content.into(),
        }
    }
}

/// A transient notification payload.
///
/// Constructed by an external producer (likes, comments, connection
/// requests, job matches), delivered once, not retained by Courier. The
/// producer is responsible for the durable record the client fetches later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification kind, e.g. `"connection_request"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Short title.
    pub title: String,
    /// Body text.
    pub content: String,
    /// Optional deep link into the product.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Notification {
    /// Create a new notification.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            content: content.into(),
            link: None,
        }
    }

    /// Attach a deep link.
    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_serializes_kind_as_type() {
        let n = Notification::new("job_match", "New match", "A role you may like")
            .with_link("/jobs/42");
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "job_match");
        assert_eq!(json["link"], "/jobs/42");
    }

    #[test]
    fn test_message_omits_unread_read_at() {
        let m = Message {
            id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: "a".into(),
            receiver_id: "b".into(),
            content: "hi".into(),
            created_at: 1,
            read_at: None,
        };
        let json = serde_json::to_value(&m).unwrap();
        assert!(json.get("read_at").is_none());
    }
}
