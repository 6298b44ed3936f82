//! # courier-store
//!
//! The collaborator boundary of the Courier realtime core.
//!
//! The authoritative store for users, conversations, messages, and
//! notifications is owned by external services. This crate defines the
//! interface Courier consumes:
//!
//! - **`TokenVerifier`** - decode a bearer credential into a user identity
//! - **`Store`** - lookups and writes against the persisted store
//! - **Canonical types** - `User`, `Message`, `Notification` as returned
//!   by the store after a write
//!
//! All store calls are asynchronous and may fail independently of Courier's
//! in-memory state; callers decide per operation whether a failure aborts
//! the operation or degrades to a logged no-op.
//!
//! The [`memory`] module provides an in-memory implementation of both
//! traits for tests and local development.

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{AuthError, StoreError};
pub use memory::MemoryStore;
pub use traits::{SharedStore, SharedVerifier, Store, TokenVerifier};
pub use types::{
    ConversationId, Message, MessageId, NewMessage, Notification, NotificationId, User, UserId,
    UserIdentity,
};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
