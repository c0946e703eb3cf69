//! # huddle-core
//!
//! Presence tracking and event relay for the Huddle chat server.
//!
//! This crate provides the transport-agnostic heart of the system:
//!
//! - **ParticipantRegistry** - Single source of truth for who is joined
//! - **RelayGateway** - Interprets inbound events and fans out outbound ones
//! - **ConnectionHandle** - Per-connection outbound queue the transport drains
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────────────┐
//! │  Transport  │────▶│ RelayGateway │────▶│ ParticipantRegistry  │
//! └─────────────┘     └──────────────┘     └──────────────────────┘
//!        ▲                    │
//!        └────────────────────┘
//!          ConnectionHandle (outbound events)
//! ```
//!
//! The transport opens a connection, calls `connect`, feeds decoded client
//! events into `dispatch`, and calls `disconnect` when the socket closes.
//! Everything the gateway wants delivered comes back through the handles.

pub mod connection;
pub mod gateway;
pub mod registry;

pub use connection::{ConnectionHandle, ConnectionId, DeliveryError};
pub use gateway::{GatewayStats, RelayGateway};
pub use registry::{Participant, ParticipantRegistry};
