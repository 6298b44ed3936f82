//! # courier-events
//!
//! Wire event vocabulary for the Courier realtime core.
//!
//! Events travel as JSON text frames over the WebSocket, tagged by a
//! `"type"` field:
//!
//! - [`ClientEvent`] - everything a client may send
//! - [`ServerEvent`] - everything the server may emit
//!
//! ## Example
//!
//! ```rust
//! use courier_events::{codec, ClientEvent};
//!
//! let event = codec::decode(r#"{"type":"join_conversation","conversation_id":"c1"}"#).unwrap();
//! assert!(matches!(event, ClientEvent::JoinConversation { .. }));
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, encode, EventError};
pub use events::{codes, ClientEvent, ServerEvent};
