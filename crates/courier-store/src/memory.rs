//! In-memory store and verifier.
//!
//! Backs tests and local development. Tokens have the shape issued by
//! [`MemoryStore::issue_token`] and can be expired or have their user
//! removed to exercise the failure paths. Presence writes can be forced to
//! fail to exercise the best-effort path.

use crate::error::{AuthError, StoreError};
use crate::now_millis;
use crate::traits::{Store, TokenVerifier};
use crate::types::{Message, NewMessage, Notification, User, UserId, UserIdentity};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Clone)]
struct TokenRecord {
    user_id: UserId,
    expired: bool,
}

/// In-memory implementation of [`Store`] and [`TokenVerifier`].
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<UserId, User>,
    conversations: DashMap<String, HashSet<UserId>>,
    messages: DashMap<String, Message>,
    notifications: DashMap<String, Notification>,
    presence: DashMap<UserId, (bool, u64)>,
    tokens: DashMap<String, TokenRecord>,
    read_notifications: DashSet<String>,
    next_message_id: AtomicU64,
    fail_presence_writes: AtomicBool,
    fail_message_writes: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user, returning their id.
    pub fn add_user(&self, id: impl Into<UserId>, display_name: impl Into<String>) -> UserId {
        let id = id.into();
        self.users.insert(
            id.clone(),
            User {
                id: id.clone(),
                display_name: display_name.into(),
            },
        );
        id
    }

    /// Remove a user, simulating account deletion after token issuance.
    pub fn remove_user(&self, id: &str) {
        self.users.remove(id);
    }

    /// Create a conversation with the given participant set.
    pub fn add_conversation(&self, id: impl Into<String>, participants: &[&str]) {
        self.conversations.insert(
            id.into(),
            participants.iter().map(|p| (*p).to_string()).collect(),
        );
    }

    /// Register a notification id so it can be acknowledged.
    pub fn add_notification(&self, id: impl Into<String>, notification: Notification) {
        self.notifications.insert(id.into(), notification);
    }

    /// Issue a bearer token for a user.
    pub fn issue_token(&self, user_id: &str) -> String {
        let token = format!("token-{}-{:x}", user_id, now_millis());
        self.tokens.insert(
            token.clone(),
            TokenRecord {
                user_id: user_id.to_string(),
                expired: false,
            },
        );
        token
    }

    /// Mark an issued token as expired.
    pub fn expire_token(&self, token: &str) {
        if let Some(mut record) = self.tokens.get_mut(token) {
            record.expired = true;
        }
    }

    /// Force subsequent presence writes to fail.
    pub fn fail_presence_writes(&self, fail: bool) {
        self.fail_presence_writes.store(fail, Ordering::Relaxed);
    }

    /// Force subsequent message persists to fail.
    pub fn fail_message_writes(&self, fail: bool) {
        self.fail_message_writes.store(fail, Ordering::Relaxed);
    }

    /// The last presence row written for a user, if any.
    #[must_use]
    pub fn presence_row(&self, user_id: &str) -> Option<(bool, u64)> {
        self.presence.get(user_id).map(|r| *r)
    }

    /// A stored message by id.
    #[must_use]
    pub fn message(&self, message_id: &str) -> Option<Message> {
        self.messages.get(message_id).map(|m| m.clone())
    }

    /// Whether a notification has been acknowledged.
    #[must_use]
    pub fn notification_read(&self, notification_id: &str) -> bool {
        self.read_notifications.contains(notification_id)
    }
}

#[async_trait]
impl TokenVerifier for MemoryStore {
    async fn verify_token(&self, token: &str) -> Result<UserIdentity, AuthError> {
        let record = self
            .tokens
            .get(token)
            .ok_or_else(|| AuthError::Invalid("unknown token".into()))?;

        if record.expired {
            return Err(AuthError::Expired);
        }

        Ok(UserIdentity::new(record.user_id.clone()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn lookup_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn conversation_participants(
        &self,
        conversation_id: &str,
    ) -> Result<HashSet<UserId>, StoreError> {
        self.conversations
            .get(conversation_id)
            .map(|p| p.clone())
            .ok_or_else(|| StoreError::NotFound(format!("conversation {conversation_id}")))
    }

    async fn persist_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        if self.fail_message_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("message write failed".into()));
        }
        let n = self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1;
        let stored = Message {
            id: format!("msg-{n}"),
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            created_at: now_millis(),
            read_at: None,
        };
        self.messages.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn mark_message_read(&self, message_id: &str) -> Result<Message, StoreError> {
        let mut message = self
            .messages
            .get_mut(message_id)
            .ok_or_else(|| StoreError::NotFound(format!("message {message_id}")))?;

        // Last write wins, but never regress behind an earlier refresh.
        let now = now_millis().max(message.read_at.unwrap_or(0));
        message.read_at = Some(now);
        Ok(message.clone())
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<(), StoreError> {
        if !self.notifications.contains_key(notification_id) {
            return Err(StoreError::NotFound(format!(
                "notification {notification_id}"
            )));
        }
        self.read_notifications.insert(notification_id.to_string());
        Ok(())
    }

    async fn touch_presence(&self, user_id: &str, online: bool) -> Result<(), StoreError> {
        if self.fail_presence_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("presence write failed".into()));
        }
        self.presence
            .insert(user_id.to_string(), (online, now_millis()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_lifecycle() {
        let store = MemoryStore::new();
        store.add_user("alice", "Alice");

        let token = store.issue_token("alice");
        let identity = store.verify_token(&token).await.unwrap();
        assert_eq!(identity.user_id, "alice");

        store.expire_token(&token);
        assert!(matches!(
            store.verify_token(&token).await,
            Err(AuthError::Expired)
        ));

        assert!(matches!(
            store.verify_token("no-such-token").await,
            Err(AuthError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_persist_assigns_id_and_timestamp() {
        let store = MemoryStore::new();
        let message = store
            .persist_message(NewMessage::new("c1", "a", "b", "hello"))
            .await
            .unwrap();

        assert!(!message.id.is_empty());
        assert!(message.created_at > 0);
        assert!(message.read_at.is_none());
        assert_eq!(store.message(&message.id).unwrap(), message);
    }

    #[tokio::test]
    async fn test_mark_read_refreshes_without_regressing() {
        let store = MemoryStore::new();
        let message = store
            .persist_message(NewMessage::new("c1", "a", "b", "hello"))
            .await
            .unwrap();

        let first = store.mark_message_read(&message.id).await.unwrap();
        let second = store.mark_message_read(&message.id).await.unwrap();

        assert!(first.read_at.is_some());
        assert!(second.read_at.unwrap() >= first.read_at.unwrap());
        assert_eq!(second.content, "hello");

        assert!(store
            .mark_message_read("msg-missing")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_presence_failure_injection() {
        let store = MemoryStore::new();
        store.touch_presence("alice", true).await.unwrap();
        assert_eq!(store.presence_row("alice").unwrap().0, true);

        store.fail_presence_writes(true);
        assert!(store.touch_presence("alice", false).await.is_err());
        // Row keeps the last successful write.
        assert_eq!(store.presence_row("alice").unwrap().0, true);
    }
}
