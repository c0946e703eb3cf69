//! Event types for the Huddle protocol.
//!
//! Events are the fundamental unit of communication in Huddle.
//! Each event travels as a JSON envelope `{"event": <name>, "data": {...}}`
//! carried in a single WebSocket text frame.

use serde::{Deserialize, Serialize};

/// An event sent by a client to the server.
///
/// A connection starts unjoined; the only event with effect in that state
/// is `join`. Field names are part of the wire contract and stay camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Enter the room under a display name.
    #[serde(rename = "join")]
    Join {
        /// Name shown to other participants. Set once per connection.
        #[serde(rename = "displayName")]
        display_name: String,
    },

    /// Send a chat message to the room.
    #[serde(rename = "message")]
    Message {
        /// Message body.
        text: String,
    },

    /// Signal that the sender started or stopped typing.
    #[serde(rename = "typing")]
    Typing {
        /// `true` when typing begins, `false` when it stops.
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
}

/// An event sent by the server to one or more connections.
///
/// The audience of each variant is decided by the relay gateway; the
/// payload itself carries no addressing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Join confirmation, delivered to the joining connection only.
    #[serde(rename = "joined")]
    Joined {
        #[serde(rename = "displayName")]
        display_name: String,
        /// Participant count after the join.
        #[serde(rename = "onlineCount")]
        online_count: usize,
    },

    /// Join announcement, delivered to every other open connection.
    #[serde(rename = "userJoined")]
    UserJoined {
        #[serde(rename = "displayName")]
        display_name: String,
        #[serde(rename = "onlineCount")]
        online_count: usize,
    },

    /// Leave announcement, delivered to all remaining open connections.
    #[serde(rename = "userLeft")]
    UserLeft {
        #[serde(rename = "displayName")]
        display_name: String,
        /// Participant count after the removal.
        #[serde(rename = "onlineCount")]
        online_count: usize,
    },

    /// Chat message relay, delivered to everyone including the sender.
    #[serde(rename = "message")]
    Message {
        #[serde(rename = "displayName")]
        display_name: String,
        text: String,
        /// RFC 3339 UTC timestamp assigned by the server at receipt.
        timestamp: String,
    },

    /// Typing signal relay, delivered to everyone except the sender.
    #[serde(rename = "typing")]
    Typing {
        #[serde(rename = "displayName")]
        display_name: String,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
}

impl ClientEvent {
    /// Get the wire name of the event, for logs and metric labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join { .. } => "join",
            ClientEvent::Message { .. } => "message",
            ClientEvent::Typing { .. } => "typing",
        }
    }

    /// Create a new Join event.
    #[must_use]
    pub fn join(display_name: impl Into<String>) -> Self {
        ClientEvent::Join {
            display_name: display_name.into(),
        }
    }

    /// Create a new Message event.
    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        ClientEvent::Message { text: text.into() }
    }

    /// Create a new Typing event.
    #[must_use]
    pub fn typing(is_typing: bool) -> Self {
        ClientEvent::Typing { is_typing }
    }
}

impl ServerEvent {
    /// Get the wire name of the event, for logs and metric labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Joined { .. } => "joined",
            ServerEvent::UserJoined { .. } => "userJoined",
            ServerEvent::UserLeft { .. } => "userLeft",
            ServerEvent::Message { .. } => "message",
            ServerEvent::Typing { .. } => "typing",
        }
    }

    /// Create a new Joined event.
    #[must_use]
    pub fn joined(display_name: impl Into<String>, online_count: usize) -> Self {
        ServerEvent::Joined {
            display_name: display_name.into(),
            online_count,
        }
    }

    /// Create a new UserJoined event.
    #[must_use]
    pub fn user_joined(display_name: impl Into<String>, online_count: usize) -> Self {
        ServerEvent::UserJoined {
            display_name: display_name.into(),
            online_count,
        }
    }

    /// Create a new UserLeft event.
    #[must_use]
    pub fn user_left(display_name: impl Into<String>, online_count: usize) -> Self {
        ServerEvent::UserLeft {
            display_name: display_name.into(),
            online_count,
        }
    }

    /// Create a new Message event.
    #[must_use]
    pub fn message(
        display_name: impl Into<String>,
        text: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        ServerEvent::Message {
            display_name: display_name.into(),
            text: text.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Create a new Typing event.
    #[must_use]
    pub fn typing(display_name: impl Into<String>, is_typing: bool) -> Self {
        ServerEvent::Typing {
            display_name: display_name.into(),
            is_typing,
        }
    }
}
