//! Room registry for Courier.
//!
//! The registry owns every room and all membership state. It is a plain
//! object injected into the gateway, never a global; a multi-instance
//! deployment would back it with a shared pub/sub transport at this seam.
//!
//! Authorization is the caller's job: the gateway verifies conversation
//! participation against the store *before* calling [`RoomRegistry::join`],
//! so a failed check never leaves a partial room entry.

use crate::room::{ConnectionId, Room, RoomId, RoomKind};
use courier_events::ServerEvent;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The connection already joined this room.
    #[error("Already joined room: {0}")]
    AlreadyJoined(RoomId),

    /// The connection is not a member of this room.
    #[error("Not joined to room: {0}")]
    NotJoined(RoomId),

    /// Per-connection conversation-room limit reached.
    #[error("Maximum joined conversations reached")]
    MaxConversationsJoined,
}

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Broadcast capacity per room.
    pub room_capacity: usize,
    /// Maximum conversation rooms a single connection may join.
    pub max_joined_conversations: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            room_capacity: 1024,
            max_joined_conversations: 100,
        }
    }
}

/// The central room registry.
///
/// Membership and fan-out over lock-free maps. Personal rooms are created
/// lazily on first join and retained for the life of the process;
/// conversation rooms are deallocated as soon as their membership empties.
pub struct RoomRegistry {
    /// Rooms indexed by id.
    rooms: DashMap<RoomId, Room>,
    /// Joined rooms per connection.
    joined: DashMap<ConnectionId, dashmap::DashSet<RoomId>>,
    /// Configuration.
    config: RegistryConfig,
}

impl RoomRegistry {
    /// Create a registry with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        info!("Creating room registry with config: {:?}", config);
        Self {
            rooms: DashMap::new(),
            joined: DashMap::new(),
            config,
        }
    }

    /// Join a connection to a room.
    ///
    /// Returns a receiver for events broadcast to the room.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate join or when the per-connection
    /// conversation limit is reached.
    pub fn join(
        &self,
        connection_id: &str,
        room_id: RoomId,
    ) -> Result<broadcast::Receiver<Arc<ServerEvent>>, RegistryError> {
        let conn_rooms = self.joined.entry(connection_id.to_string()).or_default();

        if conn_rooms.contains(&room_id) {
            return Err(RegistryError::AlreadyJoined(room_id));
        }

        if room_id.kind() == RoomKind::Conversation {
            let joined_conversations = conn_rooms
                .iter()
                .filter(|r| !r.is_personal())
                .count();
            if joined_conversations >= self.config.max_joined_conversations {
                return Err(RegistryError::MaxConversationsJoined);
            }
        }

        let mut room = self.rooms.entry(room_id.clone()).or_insert_with(|| {
            debug!(room = %room_id, "Creating room");
            Room::with_capacity(room_id.clone(), self.config.room_capacity)
        });

        let receiver = room.subscribe(connection_id);
        conn_rooms.insert(room_id.clone());

        debug!(
            room = %room_id,
            connection = %connection_id,
            members = room.member_count(),
            "Joined"
        );

        Ok(receiver)
    }

    /// Remove a connection from a room.
    ///
    /// Emptied conversation rooms are deallocated; personal rooms are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is not a member.
    pub fn leave(&self, connection_id: &str, room_id: &RoomId) -> Result<(), RegistryError> {
        let was_joined = self
            .joined
            .get(connection_id)
            .is_some_and(|rooms| rooms.remove(room_id).is_some());
        if !was_joined {
            return Err(RegistryError::NotJoined(room_id.clone()));
        }

        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.unsubscribe(connection_id);

            debug!(
                room = %room_id,
                connection = %connection_id,
                members = room.member_count(),
                "Left"
            );

            if room_id.kind() == RoomKind::Conversation && room.is_empty() {
                drop(room); // Release the lock
                self.rooms.remove(room_id);
                debug!(room = %room_id, "Deallocated empty conversation room");
            }
        }

        Ok(())
    }

    /// Remove a connection from every room it joined.
    pub fn leave_all(&self, connection_id: &str) {
        if let Some((_, rooms)) = self.joined.remove(connection_id) {
            for room_id in rooms.iter() {
                if let Some(mut room) = self.rooms.get_mut(&*room_id) {
                    room.unsubscribe(connection_id);

                    if room_id.kind() == RoomKind::Conversation && room.is_empty() {
                        let id = room_id.clone();
                        drop(room);
                        self.rooms.remove(&id);
                    }
                }
            }
        }

        debug!(connection = %connection_id, "Left all rooms");
    }

    /// Broadcast an event to every current member of a room.
    ///
    /// Best-effort, at-most-once per currently-joined connection. Absent or
    /// empty rooms make this a no-op returning 0; there is no queue or
    /// replay for members that are not joined.
    pub fn broadcast(&self, room_id: &RoomId, event: ServerEvent) -> usize {
        if let Some(room) = self.rooms.get(room_id) {
            let count = room.publish(Arc::new(event));
            trace!(room = %room_id, recipients = count, "Broadcast");
            count
        } else {
            trace!(room = %room_id, "Broadcast to absent room");
            0
        }
    }

    /// Check if a room currently exists.
    #[must_use]
    pub fn room_exists(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Get the member count of a room.
    #[must_use]
    pub fn member_count(&self, room_id: &RoomId) -> usize {
        self.rooms
            .get(room_id)
            .map(|r| r.member_count())
            .unwrap_or(0)
    }

    /// Get the rooms a connection has joined.
    #[must_use]
    pub fn joined_rooms(&self, connection_id: &str) -> Vec<RoomId> {
        self.joined
            .get(connection_id)
            .map(|rooms| rooms.iter().map(|r| r.clone()).collect())
            .unwrap_or_default()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            room_count: self.rooms.len(),
            connection_count: self.joined.len(),
            total_memberships: self.joined.iter().map(|r| r.len()).sum(),
        }
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry statistics.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Number of live rooms.
    pub room_count: usize,
    /// Number of connections with any membership.
    pub connection_count: usize,
    /// Total memberships across all connections.
    pub total_memberships: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_leave_conversation_room() {
        let registry = RoomRegistry::new();
        let room = RoomId::conversation("c1");

        let rx = registry.join("conn-1", room.clone()).unwrap();
        assert!(registry.room_exists(&room));
        assert_eq!(registry.member_count(&room), 1);
        drop(rx);

        registry.leave("conn-1", &room).unwrap();
        // Emptied conversation rooms are deallocated.
        assert!(!registry.room_exists(&room));
    }

    #[test]
    fn test_personal_room_survives_emptying() {
        let registry = RoomRegistry::new();
        let room = RoomId::personal("alice");

        let _rx = registry.join("conn-1", room.clone()).unwrap();
        registry.leave("conn-1", &room).unwrap();

        assert!(registry.room_exists(&room));
        assert_eq!(registry.member_count(&room), 0);
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let registry = RoomRegistry::new();
        let room = RoomId::conversation("c1");

        let _rx = registry.join("conn-1", room.clone()).unwrap();
        assert!(matches!(
            registry.join("conn-1", room),
            Err(RegistryError::AlreadyJoined(_))
        ));
    }

    #[test]
    fn test_conversation_limit_excludes_personal_room() {
        let registry = RoomRegistry::with_config(RegistryConfig {
            max_joined_conversations: 2,
            ..RegistryConfig::default()
        });

        let _p = registry.join("conn-1", RoomId::personal("alice")).unwrap();
        let _a = registry.join("conn-1", RoomId::conversation("c1")).unwrap();
        let _b = registry.join("conn-1", RoomId::conversation("c2")).unwrap();

        assert!(matches!(
            registry.join("conn-1", RoomId::conversation("c3")),
            Err(RegistryError::MaxConversationsJoined)
        ));
    }

    #[test]
    fn test_broadcast_reaches_all_members() {
        let registry = RoomRegistry::new();
        let room = RoomId::conversation("c1");

        let mut rx1 = registry.join("conn-1", room.clone()).unwrap();
        let mut rx2 = registry.join("conn-2", room.clone()).unwrap();

        let count = registry.broadcast(&room, ServerEvent::user_typing("c1", "alice", true));
        assert_eq!(count, 2);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_to_absent_room_is_noop() {
        let registry = RoomRegistry::new();
        let count = registry.broadcast(
            &RoomId::conversation("nowhere"),
            ServerEvent::user_typing("nowhere", "alice", true),
        );
        assert_eq!(count, 0);
    }

    #[test]
    fn test_leave_all_cleans_up() {
        let registry = RoomRegistry::new();

        let _p = registry.join("conn-1", RoomId::personal("alice")).unwrap();
        let _c = registry.join("conn-1", RoomId::conversation("c1")).unwrap();

        registry.leave_all("conn-1");

        assert!(!registry.room_exists(&RoomId::conversation("c1")));
        assert!(registry.room_exists(&RoomId::personal("alice")));
        assert_eq!(registry.stats().connection_count, 0);
    }

    #[test]
    fn test_leave_without_membership_rejected() {
        let registry = RoomRegistry::new();
        assert!(matches!(
            registry.leave("conn-1", &RoomId::conversation("c1")),
            Err(RegistryError::NotJoined(_))
        ));
    }

    #[test]
    fn test_stats() {
        let registry = RoomRegistry::new();

        let _a = registry.join("conn-1", RoomId::personal("alice")).unwrap();
        let _b = registry.join("conn-1", RoomId::conversation("c1")).unwrap();
        let _c = registry.join("conn-2", RoomId::conversation("c1")).unwrap();

        let stats = registry.stats();
        assert_eq!(stats.room_count, 2);
        assert_eq!(stats.connection_count, 2);
        assert_eq!(stats.total_memberships, 3);
    }
}
