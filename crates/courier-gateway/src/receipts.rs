//! Read-receipt synchronizer.
//!
//! Persist-then-notify: `read_at` is written to the store first, then the
//! receipt goes to the *original sender's* personal room only. The rest of
//! the conversation never sees it; only the sender's devices update their
//! delivery-state UI.

use crate::metrics;
use courier_core::{RoomId, RoomRegistry};
use courier_events::ServerEvent;
use courier_store::{SharedStore, Store, StoreError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Orchestrates persist-then-notify for read acknowledgements.
#[derive(Clone)]
pub struct ReceiptSync {
    registry: Arc<RoomRegistry>,
    store: SharedStore,
}

impl ReceiptSync {
    /// Create a synchronizer over the given registry and store.
    #[must_use]
    pub fn new(registry: Arc<RoomRegistry>, store: SharedStore) -> Self {
        Self { registry, store }
    }

    /// Mark a message read and notify its sender.
    ///
    /// The write is last-write-wins: marking an already-read message
    /// refreshes `read_at` rather than rejecting, and the relayed receipt
    /// always carries the persisted value.
    ///
    /// # Errors
    ///
    /// Returns the store error if the write fails; no receipt is relayed in
    /// that case.
    pub async fn mark_read(
        &self,
        message_id: &str,
        conversation_id: &str,
        reader_id: &str,
    ) -> Result<(), StoreError> {
        let message = self.store.mark_message_read(message_id).await?;

        let Some(read_at) = message.read_at else {
            warn!(message = %message.id, "Store returned no read timestamp; receipt skipped");
            return Ok(());
        };

        let delivered = self.registry.broadcast(
            &RoomId::personal(message.sender_id.as_str()),
            ServerEvent::message_read_receipt(
                message.id.as_str(),
                message.conversation_id.as_str(),
                read_at,
            ),
        );

        metrics::record_receipt_relayed();
        debug!(
            message = %message.id,
            conversation = %conversation_id,
            reader = %reader_id,
            recipients = delivered,
            "Read receipt relayed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_store::{MemoryStore, NewMessage, Store};

    async fn seeded() -> (ReceiptSync, Arc<RoomRegistry>, Arc<MemoryStore>, String) {
        let registry = Arc::new(RoomRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let message = store
            .persist_message(NewMessage::new("conv1", "alice", "bob", "Hello"))
            .await
            .unwrap();
        let sync = ReceiptSync::new(registry.clone(), store.clone());
        (sync, registry, store, message.id)
    }

    fn receipt_read_at(event: &ServerEvent) -> u64 {
        match event {
            ServerEvent::MessageReadReceipt { read_at, .. } => *read_at,
            other => panic!("expected message_read_receipt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_receipt_reaches_sender_only() {
        let (sync, registry, store, message_id) = seeded().await;

        let mut alice = registry.join("conn-a", RoomId::personal("alice")).unwrap();
        let mut bob = registry.join("conn-b", RoomId::personal("bob")).unwrap();

        sync.mark_read(&message_id, "conv1", "bob").await.unwrap();

        let event = alice.recv().await.unwrap();
        let persisted = store.message(&message_id).unwrap();
        assert_eq!(receipt_read_at(&event), persisted.read_at.unwrap());
        assert!(bob.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_replay_never_regresses_read_at() {
        let (sync, registry, _store, message_id) = seeded().await;
        let mut alice = registry.join("conn-a", RoomId::personal("alice")).unwrap();

        sync.mark_read(&message_id, "conv1", "bob").await.unwrap();
        sync.mark_read(&message_id, "conv1", "bob").await.unwrap();

        let first = receipt_read_at(&alice.recv().await.unwrap());
        let second = receipt_read_at(&alice.recv().await.unwrap());
        assert!(second >= first);
    }

    #[tokio::test]
    async fn test_unknown_message_is_not_found() {
        let (sync, registry, _store, _message_id) = seeded().await;
        let mut alice = registry.join("conn-a", RoomId::personal("alice")).unwrap();

        let result = sync.mark_read("msg-missing", "conv1", "bob").await;
        assert!(result.unwrap_err().is_not_found());
        assert!(alice.try_recv().is_err());
    }
}
