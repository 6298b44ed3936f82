//! Handshake authentication.
//!
//! Runs strictly before any room membership or presence change: a refused
//! credential leaves no observable trace in the gateway.

use courier_store::{AuthError, Store, TokenVerifier, UserIdentity};
use tracing::debug;

/// Resolve a bearer credential to a live user identity.
///
/// Verifies the token, then confirms the user still exists in the external
/// store; a token whose user has since been deleted is refused like any
/// other bad credential.
///
/// # Errors
///
/// Returns an [`AuthError`] for a missing, malformed, or expired token, or
/// one resolving to a vanished user.
pub async fn authenticate(
    verifier: &dyn TokenVerifier,
    store: &dyn Store,
    token: Option<&str>,
) -> Result<UserIdentity, AuthError> {
    let token = token.ok_or(AuthError::Missing)?;

    let identity = verifier.verify_token(token).await?;

    match store.lookup_user(&identity.user_id).await? {
        Some(user) => {
            debug!(user = %user.id, "Handshake authenticated");
            Ok(identity)
        }
        None => Err(AuthError::UnknownUser(identity.user_id)),
    }
}
