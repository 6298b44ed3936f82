//! Room abstraction for Courier.
//!
//! Rooms are named multicast groups. Every connection of a user joins that
//! user's personal room; conversation rooms are joined per conversation
//! after a participant check.

use courier_events::ServerEvent;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default broadcast capacity per room.
const DEFAULT_ROOM_CAPACITY: usize = 1024;

/// A connection identifier.
pub type ConnectionId = String;

/// The two room kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKind {
    /// One room per user, joined by all of that user's connections.
    Personal,
    /// One room per conversation, joined by participants only.
    Conversation,
}

/// A room identifier: `user:<id>` or `conversation:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// The personal room of a user.
    Personal(String),
    /// The room of a conversation.
    Conversation(String),
}

impl RoomId {
    /// The personal room of a user.
    #[must_use]
    pub fn personal(user_id: impl Into<String>) -> Self {
        RoomId::Personal(user_id.into())
    }

    /// The room of a conversation.
    #[must_use]
    pub fn conversation(conversation_id: impl Into<String>) -> Self {
        RoomId::Conversation(conversation_id.into())
    }

    /// The room kind.
    #[must_use]
    pub fn kind(&self) -> RoomKind {
        match self {
            RoomId::Personal(_) => RoomKind::Personal,
            RoomId::Conversation(_) => RoomKind::Conversation,
        }
    }

    /// Whether this is a personal room.
    #[must_use]
    pub fn is_personal(&self) -> bool {
        self.kind() == RoomKind::Personal
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomId::Personal(id) => write!(f, "user:{id}"),
            RoomId::Conversation(id) => write!(f, "conversation:{id}"),
        }
    }
}

/// A room for multicast event delivery.
#[derive(Debug)]
pub struct Room {
    /// Room identifier.
    id: RoomId,
    /// Broadcast sender for this room.
    sender: broadcast::Sender<Arc<ServerEvent>>,
    /// Set of member connection IDs.
    members: HashSet<ConnectionId>,
}

impl Room {
    /// Create a new room.
    #[must_use]
    pub fn new(id: RoomId) -> Self {
        Self::with_capacity(id, DEFAULT_ROOM_CAPACITY)
    }

    /// Create a new room with a specific broadcast capacity.
    #[must_use]
    pub fn with_capacity(id: RoomId, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            id,
            sender,
            members: HashSet::new(),
        }
    }

    /// Get the room identifier.
    #[must_use]
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Get the number of member connections.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Check if a connection is a member.
    #[must_use]
    pub fn is_member(&self, connection_id: &str) -> bool {
        self.members.contains(connection_id)
    }

    /// Add a connection to this room.
    ///
    /// Returns a receiver for events published to the room.
    pub fn subscribe(
        &mut self,
        connection_id: impl Into<ConnectionId>,
    ) -> broadcast::Receiver<Arc<ServerEvent>> {
        let conn_id = connection_id.into();
        self.members.insert(conn_id.clone());
        debug!(room = %self.id, connection = %conn_id, "Connection joined room");
        self.sender.subscribe()
    }

    /// Remove a connection from this room.
    ///
    /// Returns `true` if the connection was a member.
    pub fn unsubscribe(&mut self, connection_id: &str) -> bool {
        let removed = self.members.remove(connection_id);
        if removed {
            debug!(room = %self.id, connection = %connection_id, "Connection left room");
        }
        removed
    }

    /// Publish an event to every member.
    ///
    /// Delivery is best-effort: returns the number of receivers the event
    /// reached, 0 if the room is currently empty.
    pub fn publish(&self, event: Arc<ServerEvent>) -> usize {
        trace!(room = %self.id, "Publishing event");
        self.sender.send(event).unwrap_or_default()
    }

    /// Get all member connection IDs.
    #[must_use]
    pub fn members(&self) -> Vec<ConnectionId> {
        self.members.iter().cloned().collect()
    }

    /// Check if the room has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_display() {
        assert_eq!(RoomId::personal("alice").to_string(), "user:alice");
        assert_eq!(
            RoomId::conversation("conv1").to_string(),
            "conversation:conv1"
        );
        assert!(RoomId::personal("alice").is_personal());
        assert_eq!(RoomId::conversation("c").kind(), RoomKind::Conversation);
    }

    #[test]
    fn test_room_subscribe_unsubscribe() {
        let mut room = Room::new(RoomId::personal("alice"));

        let _rx = room.subscribe("conn-1");
        assert_eq!(room.member_count(), 1);
        assert!(room.is_member("conn-1"));

        let _rx2 = room.subscribe("conn-2");
        assert_eq!(room.member_count(), 2);

        assert!(room.unsubscribe("conn-1"));
        assert!(!room.is_member("conn-1"));

        // Unsubscribing twice is a no-op.
        assert!(!room.unsubscribe("conn-1"));
    }

    #[tokio::test]
    async fn test_room_publish() {
        let mut room = Room::new(RoomId::conversation("c1"));
        let mut rx = room.subscribe("conn-1");

        let event = Arc::new(ServerEvent::user_typing("c1", "alice", true));
        assert_eq!(room.publish(event), 1);

        let received = rx.recv().await.unwrap();
        assert!(matches!(
            *received,
            ServerEvent::UserTyping { is_typing: true, .. }
        ));
    }

    #[test]
    fn test_publish_to_empty_room_is_noop() {
        let room = Room::new(RoomId::conversation("c1"));
        let event = Arc::new(ServerEvent::user_typing("c1", "alice", true));
        assert_eq!(room.publish(event), 0);
    }
}
