//! Connection identity and outbound delivery for Huddle.
//!
//! The transport layer owns the sockets; the core sees each connection as
//! an opaque [`ConnectionId`] plus a [`ConnectionHandle`] it can deliver
//! outbound events through.

use huddle_protocol::ServerEvent;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc;

/// Counter for ensuring unique IDs even within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
///
/// Assigned by the transport layer when a socket opens; never reused while
/// the connection is open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a connection ID unique for the process lifetime.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Delivery errors for a single recipient.
///
/// Both variants are per-recipient outcomes: the caller logs them and
/// continues the fan-out with the remaining recipients.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The recipient's outbound queue is full.
    #[error("Outbound queue full")]
    QueueFull,

    /// The recipient's outbound queue is gone (socket task exited).
    #[error("Connection closed")]
    Closed,
}

/// Handle for delivering outbound events to one connection.
///
/// Wraps a bounded queue drained by the connection's transport task.
/// Delivery never blocks; a slow or dead consumer surfaces as a
/// [`DeliveryError`] and affects nobody else.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver the transport drains.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue an event for delivery to this connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue is full or the receiver is gone.
    pub fn deliver(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Check if the receiving side is still attached.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}
