//! Traits consumed by the Courier core.
//!
//! Implementations live with the owning services; Courier only ever calls
//! through these seams. Every call is atomic from Courier's point of view.

use crate::error::{AuthError, StoreError};
use crate::types::{Message, NewMessage, User, UserId, UserIdentity};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Credential verification.
///
/// Decodes and validates a bearer token into a user identity. The token
/// format is owned by the identity service; Courier treats it as opaque.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a bearer token.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the token is malformed, does not verify,
    /// or is expired.
    async fn verify_token(&self, token: &str) -> Result<UserIdentity, AuthError>;
}

/// The authoritative persisted store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up a user by id. Returns `None` if the user no longer exists.
    async fn lookup_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    /// The set of users participating in a conversation.
    async fn conversation_participants(
        &self,
        conversation_id: &str,
    ) -> Result<HashSet<UserId>, StoreError>;

    /// Persist a chat message, assigning `id` and `created_at`.
    ///
    /// Returns the canonical message to relay.
    async fn persist_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// Set `read_at` on a message. Last write wins: re-invoking on an
    /// already-read message refreshes the timestamp rather than rejecting.
    ///
    /// Returns the canonical message carrying the persisted `read_at`.
    async fn mark_message_read(&self, message_id: &str) -> Result<Message, StoreError>;

    /// Acknowledge a notification as read. No relay follows.
    async fn mark_notification_read(&self, notification_id: &str) -> Result<(), StoreError>;

    /// Best-effort presence write: records `last_seen` and the online flag.
    async fn touch_presence(&self, user_id: &str, online: bool) -> Result<(), StoreError>;
}

/// Shared store handle as held by the gateway.
pub type SharedStore = Arc<dyn Store>;

/// Shared token verifier handle.
pub type SharedVerifier = Arc<dyn TokenVerifier>;
