//! Message delivery pipeline.
//!
//! Persist-then-broadcast: the store write is the authority, the socket
//! relay is a low-latency hint. Broadcast order for a conversation follows
//! persistence-completion order, not call order; any ordering-sensitive
//! consumer reconciles against the store, not the relay stream.

use crate::metrics;
use courier_core::{RoomId, RoomRegistry};
use courier_events::ServerEvent;
use courier_store::{Message, NewMessage, SharedStore, Store, StoreError};
use std::sync::Arc;
use tracing::debug;

/// Orchestrates persist-then-broadcast for chat messages.
#[derive(Clone)]
pub struct MessagePipeline {
    registry: Arc<RoomRegistry>,
    store: SharedStore,
}

impl MessagePipeline {
    /// Create a pipeline over the given registry and store.
    #[must_use]
    pub fn new(registry: Arc<RoomRegistry>, store: SharedStore) -> Self {
        Self { registry, store }
    }

    /// Persist a message, then relay the canonical object.
    ///
    /// # Errors
    ///
    /// Returns the store error if persistence fails; no broadcast occurs in
    /// that case and the caller (the REST mutation path) surfaces the error.
    pub async fn send_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let message = self.store.persist_message(message).await?;
        self.relay(&message);
        Ok(message)
    }

    /// Relay an already-persisted message to the conversation room and the
    /// receiver's personal room.
    ///
    /// The personal-room copy reaches devices that have not joined the
    /// conversation room, e.g. for a conversation-list badge. Empty rooms
    /// are a silent no-op: the message is durable and discoverable on the
    /// next fetch.
    pub fn relay(&self, message: &Message) -> usize {
        let conversation = self.registry.broadcast(
            &RoomId::conversation(message.conversation_id.as_str()),
            ServerEvent::new_message(message.clone()),
        );
        let personal = self.registry.broadcast(
            &RoomId::personal(message.receiver_id.as_str()),
            ServerEvent::new_message(message.clone()),
        );

        metrics::record_message_relayed();
        debug!(
            message = %message.id,
            conversation = %message.conversation_id,
            conversation_recipients = conversation,
            personal_recipients = personal,
            "Message relayed"
        );

        conversation + personal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_store::MemoryStore;

    fn pipeline_with_store() -> (MessagePipeline, Arc<RoomRegistry>, Arc<MemoryStore>) {
        let registry = Arc::new(RoomRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let pipeline = MessagePipeline::new(registry.clone(), store.clone());
        (pipeline, registry, store)
    }

    fn relayed_message(event: &ServerEvent) -> &Message {
        match event {
            ServerEvent::NewMessage { message } => message,
            other => panic!("expected new_message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_canonical_message_reaches_both_rooms() {
        let (pipeline, registry, _store) = pipeline_with_store();

        let mut in_conversation = registry
            .join("conn-b1", RoomId::conversation("conv1"))
            .unwrap();
        let mut personal = registry.join("conn-b2", RoomId::personal("bob")).unwrap();

        let sent = pipeline
            .send_message(NewMessage::new("conv1", "alice", "bob", "Hello"))
            .await
            .unwrap();

        let via_conversation = in_conversation.recv().await.unwrap();
        let via_personal = personal.recv().await.unwrap();

        assert_eq!(relayed_message(&via_conversation), &sent);
        assert_eq!(relayed_message(&via_personal), &sent);
        assert_eq!(sent.content, "Hello");
        assert!(!sent.id.is_empty());
    }

    #[tokio::test]
    async fn test_outsider_receives_nothing() {
        let (pipeline, registry, _store) = pipeline_with_store();

        let mut outsider = registry.join("conn-z", RoomId::personal("zoe")).unwrap();

        pipeline
            .send_message(NewMessage::new("conv1", "alice", "bob", "Hello"))
            .await
            .unwrap();

        assert!(outsider.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_broadcast_when_persistence_fails() {
        let (pipeline, registry, store) = pipeline_with_store();
        store.fail_message_writes(true);

        let mut personal = registry.join("conn-b", RoomId::personal("bob")).unwrap();

        let result = pipeline
            .send_message(NewMessage::new("conv1", "alice", "bob", "Hello"))
            .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(personal.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_rooms_are_a_silent_noop() {
        let (pipeline, _registry, store) = pipeline_with_store();

        let sent = pipeline
            .send_message(NewMessage::new("conv1", "alice", "bob", "Hello"))
            .await
            .unwrap();

        // Nobody connected, but the message is durably stored.
        assert_eq!(store.message(&sent.id).unwrap(), sent);
    }
}
