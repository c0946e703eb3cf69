//! # huddle-protocol
//!
//! Wire protocol definitions for the Huddle chat relay.
//!
//! This crate defines the JSON event protocol spoken between Huddle
//! clients and the server: typed inbound/outbound events and the codec.
//!
//! ## Event Types
//!
//! Inbound (client → server): `join`, `message`, `typing`.
//! Outbound (server → clients): `joined`, `userJoined`, `userLeft`,
//! `message`, `typing`.
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{codec, ClientEvent, ServerEvent};
//!
//! let event = ServerEvent::joined("alice", 1);
//! let encoded = codec::encode(&event).unwrap();
//!
//! let inbound = codec::decode(r#"{"event":"join","data":{"displayName":"alice"}}"#).unwrap();
//! assert_eq!(inbound, ClientEvent::join("alice"));
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, encode, ProtocolError, MAX_EVENT_BYTES};
pub use events::{ClientEvent, ServerEvent};
