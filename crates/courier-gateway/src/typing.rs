//! Typing indicator relay.
//!
//! Typing signals are pure relays: no durable write, no deduplication.
//! Each signal goes to the *target user's personal room*, not the
//! conversation room, so it reaches exactly the intended recipient's
//! devices even when conversation-room membership is stale.
//!
//! The gateway does not trust clients to always deliver a matching stop:
//! every start arms a deadline for the (conversation, typist, target)
//! triple, re-armed on repeat starts, and an expired deadline synthesizes
//! the stop the client never sent.

use crate::metrics;
use courier_core::{RoomId, RoomRegistry};
use courier_events::ServerEvent;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TypingKey {
    conversation_id: String,
    from_user: String,
    to_user: String,
}

/// Relays typing signals between a typist and a recipient.
#[derive(Clone)]
pub struct TypingRelay {
    registry: Arc<RoomRegistry>,
    expiry: Duration,
    deadlines: Arc<DashMap<TypingKey, JoinHandle<()>>>,
}

impl TypingRelay {
    /// Create a relay over the given registry.
    #[must_use]
    pub fn new(registry: Arc<RoomRegistry>, expiry: Duration) -> Self {
        Self {
            registry,
            expiry,
            deadlines: Arc::new(DashMap::new()),
        }
    }

    /// Relay a typing-start and arm the expiry deadline.
    pub fn start(&self, conversation_id: &str, from_user: &str, to_user: &str) {
        let delivered = self.registry.broadcast(
            &RoomId::personal(to_user),
            ServerEvent::user_typing(conversation_id, from_user, true),
        );
        metrics::record_typing_relayed();
        trace!(
            conversation = %conversation_id,
            from = %from_user,
            to = %to_user,
            recipients = delivered,
            "Typing start relayed"
        );

        let key = TypingKey {
            conversation_id: conversation_id.to_string(),
            from_user: from_user.to_string(),
            to_user: to_user.to_string(),
        };

        let registry = self.registry.clone();
        let deadlines = self.deadlines.clone();
        let expiry = self.expiry;
        let expired_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            deadlines.remove(&expired_key);
            debug!(
                conversation = %expired_key.conversation_id,
                from = %expired_key.from_user,
                "Typing deadline expired; synthesizing stop"
            );
            metrics::record_typing_relayed();
            registry.broadcast(
                &RoomId::personal(expired_key.to_user.as_str()),
                ServerEvent::user_typing(
                    expired_key.conversation_id.as_str(),
                    expired_key.from_user.as_str(),
                    false,
                ),
            );
        });

        // Re-arm: a repeat start replaces the previous deadline.
        if let Some(previous) = self.deadlines.insert(key, handle) {
            previous.abort();
        }
    }

    /// Relay a typing-stop and disarm the deadline.
    pub fn stop(&self, conversation_id: &str, from_user: &str, to_user: &str) {
        let key = TypingKey {
            conversation_id: conversation_id.to_string(),
            from_user: from_user.to_string(),
            to_user: to_user.to_string(),
        };
        if let Some((_, handle)) = self.deadlines.remove(&key) {
            handle.abort();
        }

        let delivered = self.registry.broadcast(
            &RoomId::personal(to_user),
            ServerEvent::user_typing(conversation_id, from_user, false),
        );
        metrics::record_typing_relayed();
        trace!(
            conversation = %conversation_id,
            from = %from_user,
            to = %to_user,
            recipients = delivered,
            "Typing stop relayed"
        );
    }

    /// Number of armed deadlines.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.deadlines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_typing(event: &ServerEvent) -> Option<bool> {
        match event {
            ServerEvent::UserTyping { is_typing, .. } => Some(*is_typing),
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_reaches_only_target_personal_room() {
        let registry = Arc::new(RoomRegistry::new());
        let relay = TypingRelay::new(registry.clone(), Duration::from_secs(6));

        let mut bob = registry.join("conn-b", RoomId::personal("bob")).unwrap();
        let mut carol = registry.join("conn-c", RoomId::personal("carol")).unwrap();

        relay.start("c1", "alice", "bob");

        let event = bob.recv().await.unwrap();
        assert_eq!(is_typing(&event), Some(true));
        assert!(carol.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_disarms_and_relays() {
        let registry = Arc::new(RoomRegistry::new());
        let relay = TypingRelay::new(registry.clone(), Duration::from_secs(6));
        let mut bob = registry.join("conn-b", RoomId::personal("bob")).unwrap();

        relay.start("c1", "alice", "bob");
        relay.stop("c1", "alice", "bob");
        assert_eq!(relay.armed_count(), 0);

        assert_eq!(is_typing(&bob.recv().await.unwrap()), Some(true));
        assert_eq!(is_typing(&bob.recv().await.unwrap()), Some(false));

        // The disarmed deadline must not fire a second stop.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(bob.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_stop_is_synthesized() {
        let registry = Arc::new(RoomRegistry::new());
        let relay = TypingRelay::new(registry.clone(), Duration::from_secs(6));
        let mut bob = registry.join("conn-b", RoomId::personal("bob")).unwrap();

        relay.start("c1", "alice", "bob");
        assert_eq!(is_typing(&bob.recv().await.unwrap()), Some(true));

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(is_typing(&bob.recv().await.unwrap()), Some(false));
        assert_eq!(relay.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_start_rearms_deadline() {
        let registry = Arc::new(RoomRegistry::new());
        let relay = TypingRelay::new(registry.clone(), Duration::from_secs(6));
        let mut bob = registry.join("conn-b", RoomId::personal("bob")).unwrap();

        relay.start("c1", "alice", "bob");
        tokio::time::sleep(Duration::from_secs(4)).await;
        relay.start("c1", "alice", "bob");

        assert_eq!(is_typing(&bob.recv().await.unwrap()), Some(true));
        assert_eq!(is_typing(&bob.recv().await.unwrap()), Some(true));

        // Past the first deadline but within the re-armed one.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(bob.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(is_typing(&bob.recv().await.unwrap()), Some(false));
    }
}
