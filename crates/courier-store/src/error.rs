//! Error types at the collaborator boundary.

use crate::types::UserId;
use thiserror::Error;

/// Failures while resolving a bearer credential to a user identity.
///
/// Any variant refuses the handshake; no room or presence state may exist
/// for a connection that failed authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was supplied.
    #[error("Missing credential")]
    Missing,

    /// The credential is malformed or does not verify.
    #[error("Invalid credential: {0}")]
    Invalid(String),

    /// The credential verified but is past its expiry.
    #[error("Expired credential")]
    Expired,

    /// The credential resolved to a user the store no longer knows.
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    /// The store could not be reached while resolving the identity.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of the external persisted store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store rejected or could not complete the call.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether this error means the target entity is missing, as opposed to
    /// the store being unreachable.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
