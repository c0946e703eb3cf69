//! Presence registry for Huddle.
//!
//! The registry is the single source of truth for who is currently joined:
//! a connection that has opened but not joined has no entry here and is
//! invisible to presence counts.

use crate::connection::ConnectionId;
use std::collections::HashMap;
use tracing::debug;

/// A joined participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Connection the participant joined on.
    pub connection_id: ConnectionId,
    /// Name shown to other participants. Immutable for the connection's
    /// lifetime except through re-registration.
    pub display_name: String,
}

/// In-memory store mapping connection IDs to participants.
///
/// Holds no lock of its own; the gateway serializes all access. Owns no
/// network state.
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    members: HashMap<ConnectionId, Participant>,
}

impl ParticipantRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for a connection.
    ///
    /// Last write wins. Returns the displaced entry when the connection
    /// was already registered, which is how a duplicate join is detected.
    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        display_name: impl Into<String>,
    ) -> Option<Participant> {
        let participant = Participant {
            connection_id: connection_id.clone(),
            display_name: display_name.into(),
        };

        let displaced = self.members.insert(connection_id.clone(), participant);
        if displaced.is_none() {
            debug!(connection = %connection_id, "Registry: participant registered");
        }

        displaced
    }

    /// Remove the entry for a connection, returning it if present.
    ///
    /// Absence is a normal outcome (a connection that disconnects before
    /// joining was never registered).
    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<Participant> {
        let participant = self.members.remove(connection_id);
        if participant.is_some() {
            debug!(connection = %connection_id, "Registry: participant removed");
        }
        participant
    }

    /// Get the entry for a connection.
    #[must_use]
    pub fn lookup(&self, connection_id: &ConnectionId) -> Option<&Participant> {
        self.members.get(connection_id)
    }

    /// Get the number of joined participants.
    ///
    /// Always computed from the live map; this value is reported in every
    /// outbound presence event.
    #[must_use]
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Get all participants. Order is unspecified.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Participant> {
        self.members.values().cloned().collect()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_unregister() {
        let mut registry = ParticipantRegistry::new();

        assert!(registry.register("conn-1".into(), "alice").is_none());
        assert_eq!(registry.count(), 1);
        assert_eq!(
            registry.lookup(&"conn-1".into()).unwrap().display_name,
            "alice"
        );

        let removed = registry.unregister(&"conn-1".into()).unwrap();
        assert_eq!(removed.display_name, "alice");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_last_write_wins() {
        let mut registry = ParticipantRegistry::new();

        registry.register("conn-1".into(), "alice");
        let displaced = registry.register("conn-1".into(), "alicia").unwrap();

        assert_eq!(displaced.display_name, "alice");
        assert_eq!(registry.count(), 1);
        assert_eq!(
            registry.lookup(&"conn-1".into()).unwrap().display_name,
            "alicia"
        );
    }

    #[test]
    fn test_unregister_absent_is_normal() {
        let mut registry = ParticipantRegistry::new();
        assert!(registry.unregister(&"never-joined".into()).is_none());
    }

    #[test]
    fn test_duplicate_display_names_allowed() {
        let mut registry = ParticipantRegistry::new();

        registry.register("conn-1".into(), "alice");
        registry.register("conn-2".into(), "alice");

        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_snapshot() {
        let mut registry = ParticipantRegistry::new();
        registry.register("conn-1".into(), "alice");
        registry.register("conn-2".into(), "bob");

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
    }
}
