//! Presence tracking for Courier.
//!
//! Online state is derived from active-connection reference counts, not
//! from explicit client signaling: a user is online iff at least one of
//! their connections is open. Multi-device is the normal case, so only the
//! 0→1 and 1→0 transitions are observable.

use courier_store::{now_millis, UserId};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

/// The observable outcome of a connect or disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceTransition {
    /// First connection: the user went from offline to online.
    WentOnline,
    /// Last connection closed: the user went from online to offline.
    WentOffline,
    /// The count moved but the online state did not change.
    Unchanged,
}

/// Per-user presence state.
///
/// Records are created on first connection and never deleted, so
/// `last_seen` survives the user going offline.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceRecord {
    /// Number of currently-open connections.
    pub active_connections: usize,
    /// Last transition timestamp in epoch milliseconds.
    pub last_seen: u64,
}

impl PresenceRecord {
    fn new() -> Self {
        Self {
            active_connections: 0,
            last_seen: now_millis(),
        }
    }

    /// Whether the user is online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.active_connections > 0
    }
}

/// Tracks online state for every user seen by this instance.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    records: DashMap<UserId, PresenceRecord>,
}

impl PresenceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection for a user.
    ///
    /// Returns [`PresenceTransition::WentOnline`] only on the 0→1 count
    /// transition.
    pub fn connected(&self, user_id: &str) -> PresenceTransition {
        let mut record = self
            .records
            .entry(user_id.to_string())
            .or_insert_with(PresenceRecord::new);

        record.active_connections += 1;
        record.last_seen = now_millis();

        if record.active_connections == 1 {
            debug!(user = %user_id, "Presence: online");
            PresenceTransition::WentOnline
        } else {
            PresenceTransition::Unchanged
        }
    }

    /// Record a closed connection for a user.
    ///
    /// Returns [`PresenceTransition::WentOffline`] only on the 1→0 count
    /// transition. The count never goes negative: a disconnect without a
    /// matching connect is logged and ignored.
    pub fn disconnected(&self, user_id: &str) -> PresenceTransition {
        let Some(mut record) = self.records.get_mut(user_id) else {
            warn!(user = %user_id, "Presence: disconnect for unknown user");
            return PresenceTransition::Unchanged;
        };

        if record.active_connections == 0 {
            warn!(user = %user_id, "Presence: disconnect with zero connections");
            return PresenceTransition::Unchanged;
        }

        record.active_connections -= 1;
        record.last_seen = now_millis();

        if record.active_connections == 0 {
            debug!(user = %user_id, "Presence: offline");
            PresenceTransition::WentOffline
        } else {
            PresenceTransition::Unchanged
        }
    }

    /// Whether a user currently has any open connection.
    #[must_use]
    pub fn is_online(&self, user_id: &str) -> bool {
        self.records
            .get(user_id)
            .is_some_and(|r| r.is_online())
    }

    /// The number of open connections for a user.
    #[must_use]
    pub fn active_connections(&self, user_id: &str) -> usize {
        self.records
            .get(user_id)
            .map(|r| r.active_connections)
            .unwrap_or(0)
    }

    /// The last transition timestamp for a user, if ever seen.
    #[must_use]
    pub fn last_seen(&self, user_id: &str) -> Option<u64> {
        self.records.get(user_id).map(|r| r.last_seen)
    }

    /// Snapshot of every known user's presence.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(UserId, PresenceRecord)> {
        self.records
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    /// Number of users currently online.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_online()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_connection_goes_online() {
        let tracker = PresenceTracker::new();

        assert!(!tracker.is_online("alice"));
        assert_eq!(tracker.connected("alice"), PresenceTransition::WentOnline);
        assert!(tracker.is_online("alice"));
    }

    #[test]
    fn test_multi_device_refcounting() {
        let tracker = PresenceTracker::new();

        assert_eq!(tracker.connected("alice"), PresenceTransition::WentOnline);
        assert_eq!(tracker.connected("alice"), PresenceTransition::Unchanged);
        assert_eq!(tracker.active_connections("alice"), 2);

        // Still online after closing one of two devices.
        assert_eq!(tracker.disconnected("alice"), PresenceTransition::Unchanged);
        assert!(tracker.is_online("alice"));

        assert_eq!(tracker.disconnected("alice"), PresenceTransition::WentOffline);
        assert!(!tracker.is_online("alice"));
    }

    #[test]
    fn test_count_never_goes_negative() {
        let tracker = PresenceTracker::new();

        assert_eq!(tracker.disconnected("alice"), PresenceTransition::Unchanged);

        tracker.connected("alice");
        tracker.disconnected("alice");
        assert_eq!(tracker.disconnected("alice"), PresenceTransition::Unchanged);
        assert_eq!(tracker.active_connections("alice"), 0);
    }

    #[test]
    fn test_record_retained_after_offline() {
        let tracker = PresenceTracker::new();

        tracker.connected("alice");
        tracker.disconnected("alice");

        assert!(tracker.last_seen("alice").is_some());
        assert_eq!(tracker.snapshot().len(), 1);
        assert_eq!(tracker.online_count(), 0);
    }
}
