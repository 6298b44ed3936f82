//! Shared gateway state.

use crate::config::Config;
use crate::messages::MessagePipeline;
use crate::notifications::Notifier;
use crate::receipts::ReceiptSync;
use crate::typing::TypingRelay;
use courier_core::{PresenceTracker, RegistryConfig, RoomRegistry};
use courier_store::{SharedStore, SharedVerifier};
use std::sync::Arc;
use std::time::Duration;

/// Everything the handlers share.
///
/// The registry and tracker are owned here and injected into the services;
/// nothing in the gateway reaches for a global.
pub struct AppState {
    /// Gateway configuration.
    pub config: Config,
    /// Room membership and fan-out.
    pub registry: Arc<RoomRegistry>,
    /// Per-user online state.
    pub presence: Arc<PresenceTracker>,
    /// The external persisted store.
    pub store: SharedStore,
    /// Credential verification.
    pub verifier: SharedVerifier,
    /// Typing indicator relay.
    pub typing: TypingRelay,
    /// Message delivery pipeline.
    pub pipeline: MessagePipeline,
    /// Read-receipt synchronizer.
    pub receipts: ReceiptSync,
    /// Notification fan-out.
    pub notifier: Notifier,
}

impl AppState {
    /// Wire up the gateway services.
    #[must_use]
    pub fn new(config: Config, store: SharedStore, verifier: SharedVerifier) -> Self {
        let registry = Arc::new(RoomRegistry::with_config(RegistryConfig {
            room_capacity: config.limits.room_capacity,
            max_joined_conversations: config.limits.max_joined_conversations,
        }));
        let presence = Arc::new(PresenceTracker::new());

        let typing = TypingRelay::new(
            registry.clone(),
            Duration::from_millis(config.typing.expiry_ms),
        );
        let pipeline = MessagePipeline::new(registry.clone(), store.clone());
        let receipts = ReceiptSync::new(registry.clone(), store.clone());
        let notifier = Notifier::new(registry.clone());

        Self {
            config,
            registry,
            presence,
            store,
            verifier,
            typing,
            pipeline,
            receipts,
            notifier,
        }
    }
}
