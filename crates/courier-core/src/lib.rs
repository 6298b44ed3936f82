//! # courier-core
//!
//! In-memory rooms, membership, and presence for the Courier realtime core.
//!
//! This crate provides the components the gateway composes:
//!
//! - **Room** - a named multicast group over a broadcast channel
//! - **RoomRegistry** - membership and fan-out across all rooms
//! - **PresenceTracker** - per-user online state from connection refcounts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │  Connection │────▶│ RoomRegistry │────▶│    Room     │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                    ┌─────────────────┐
//!                    │ PresenceTracker │
//!                    └─────────────────┘
//! ```
//!
//! All state lives in the memory of a single process; delivery is
//! best-effort with no queue or replay. Clients reconcile against the
//! persisted store on reconnect.

pub mod presence;
pub mod registry;
pub mod room;

pub use presence::{PresenceRecord, PresenceTracker, PresenceTransition};
pub use registry::{RegistryConfig, RegistryError, RegistryStats, RoomRegistry};
pub use room::{ConnectionId, Room, RoomId, RoomKind};
