//! Notification fan-out.
//!
//! The one-way push primitive every unrelated product feature uses: likes,
//! comments, connection requests, job matches. No retry and no durable
//! queue; a user with zero active connections simply does not receive the
//! push, and the producing feature has already written the durable record
//! the client fetches on next load.

use crate::metrics;
use courier_core::{RoomId, RoomRegistry};
use courier_events::ServerEvent;
use courier_store::Notification;
use std::sync::Arc;
use tracing::debug;

/// Fans notifications out to all connected devices of a user.
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<RoomRegistry>,
}

impl Notifier {
    /// Create a notifier over the given registry.
    #[must_use]
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// Push a notification to every connected device of the target user.
    ///
    /// Returns the number of devices reached, 0 when the user is offline.
    pub fn push_notification(&self, user_id: &str, notification: Notification) -> usize {
        let delivered = self.registry.broadcast(
            &RoomId::personal(user_id),
            ServerEvent::notification(notification),
        );

        metrics::record_notification_relayed();
        debug!(user = %user_id, recipients = delivered, "Notification fan-out");

        delivered
    }
}
