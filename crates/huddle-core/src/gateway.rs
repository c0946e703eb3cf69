//! Relay gateway for Huddle.
//!
//! The gateway owns the live connection set and the participant registry,
//! interprets inbound events, and fans outbound events out to the
//! computed audience.

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::registry::{Participant, ParticipantRegistry};
use chrono::{SecondsFormat, Utc};
use huddle_protocol::{ClientEvent, ServerEvent};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

/// State shared by all handlers, guarded by a single mutex.
///
/// Every handler mutates, reads the count, and snapshots its recipients
/// inside one critical section, so the count each event carries is always
/// consistent with the mutation that produced it.
#[derive(Debug, Default)]
struct GatewayState {
    /// Every open connection, joined or not. Unjoined connections still
    /// receive broadcasts.
    connections: HashMap<ConnectionId, ConnectionHandle>,
    /// Joined participants only.
    registry: ParticipantRegistry,
}

/// The central relay gateway.
///
/// The transport layer calls [`connect`](RelayGateway::connect) when a
/// socket opens, [`dispatch`](RelayGateway::dispatch) for each decoded
/// inbound event, and [`disconnect`](RelayGateway::disconnect) when the
/// socket closes. All methods take `&self` and never block or await;
/// delivery is non-blocking and per-recipient failures are isolated.
#[derive(Debug, Default)]
pub struct RelayGateway {
    state: Mutex<GatewayState>,
}

impl RelayGateway {
    /// Create a new gateway with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        // The maps are consistent after any panic; recover the guard.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an open connection. The connection starts unjoined.
    pub fn connect(&self, connection_id: ConnectionId, handle: ConnectionHandle) {
        let mut state = self.lock();
        state.connections.insert(connection_id.clone(), handle);
        debug!(
            connection = %connection_id,
            open = state.connections.len(),
            "Connection opened"
        );
    }

    /// Route an inbound event to its handler.
    pub fn dispatch(&self, connection_id: &ConnectionId, event: ClientEvent) {
        trace!(connection = %connection_id, event = event.name(), "Dispatching event");

        match event {
            ClientEvent::Join { display_name } => self.handle_join(connection_id, display_name),
            ClientEvent::Message { text } => self.handle_message(connection_id, text),
            ClientEvent::Typing { is_typing } => self.handle_typing(connection_id, is_typing),
        }
    }

    /// Remove a connection on socket close, clean or abnormal.
    ///
    /// If the connection had joined, its registry entry is removed and
    /// `userLeft` goes to all remaining open connections with the
    /// post-removal count. A connection that never joined leaves silently.
    pub fn disconnect(&self, connection_id: &ConnectionId) -> Option<Participant> {
        let (participant, recipients) = {
            let mut state = self.lock();
            state.connections.remove(connection_id);

            let participant = state.registry.unregister(connection_id);
            let recipients = match &participant {
                Some(p) => {
                    let event = ServerEvent::user_left(&p.display_name, state.registry.count());
                    Self::broadcast_targets(&state, event, None)
                }
                None => Vec::new(),
            };

            debug!(
                connection = %connection_id,
                open = state.connections.len(),
                "Connection closed"
            );

            (participant, recipients)
        };

        if let Some(p) = &participant {
            info!(connection = %connection_id, participant = %p.display_name, "Participant left");
        }
        Self::fan_out(recipients);

        participant
    }

    fn handle_join(&self, connection_id: &ConnectionId, display_name: String) {
        let recipients = {
            let mut state = self.lock();

            // Never connected, or the socket closed before the event was
            // processed.
            if !state.connections.contains_key(connection_id) {
                debug!(connection = %connection_id, "Join from unknown connection, dropping");
                return;
            }

            let displaced = state.registry.register(connection_id.clone(), &display_name);
            if let Some(prior) = displaced {
                // Duplicate join: the name is overwritten, nothing is
                // re-broadcast, and peers keep the name they first saw.
                debug!(
                    connection = %connection_id,
                    old = %prior.display_name,
                    new = %display_name,
                    "Duplicate join, display name overwritten"
                );
                return;
            }

            // Count taken after registration; `joined` and `userJoined`
            // carry the same value.
            let online_count = state.registry.count();
            info!(
                connection = %connection_id,
                participant = %display_name,
                online = online_count,
                "Participant joined"
            );

            let mut recipients = Self::broadcast_targets(
                &state,
                ServerEvent::user_joined(&display_name, online_count),
                Some(connection_id),
            );
            if let Some(handle) = state.connections.get(connection_id) {
                recipients.push((
                    handle.clone(),
                    ServerEvent::joined(&display_name, online_count),
                ));
            }
            recipients
        };

        Self::fan_out(recipients);
    }

    fn handle_message(&self, connection_id: &ConnectionId, text: String) {
        let recipients = {
            let state = self.lock();

            // The sender's name comes from the registry, never the payload.
            let Some(sender) = state.registry.lookup(connection_id) else {
                debug!(connection = %connection_id, "Message before join, dropping");
                return;
            };

            let event = ServerEvent::message(&sender.display_name, text, server_timestamp());
            trace!(
                connection = %connection_id,
                participant = %sender.display_name,
                "Relaying message"
            );

            // Everyone, sender included.
            Self::broadcast_targets(&state, event, None)
        };

        Self::fan_out(recipients);
    }

    fn handle_typing(&self, connection_id: &ConnectionId, is_typing: bool) {
        let recipients = {
            let state = self.lock();

            let Some(sender) = state.registry.lookup(connection_id) else {
                debug!(connection = %connection_id, "Typing before join, dropping");
                return;
            };

            let event = ServerEvent::typing(&sender.display_name, is_typing);
            trace!(
                connection = %connection_id,
                participant = %sender.display_name,
                is_typing,
                "Relaying typing signal"
            );

            Self::broadcast_targets(&state, event, Some(connection_id))
        };

        Self::fan_out(recipients);
    }

    /// Get the number of joined participants.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.lock().registry.count()
    }

    /// Get a snapshot of all joined participants. Order is unspecified.
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        self.lock().registry.snapshot()
    }

    /// Get gateway statistics.
    #[must_use]
    pub fn stats(&self) -> GatewayStats {
        let state = self.lock();
        GatewayStats {
            open_connections: state.connections.len(),
            joined_participants: state.registry.count(),
        }
    }

    /// Compute the recipient list under the lock.
    ///
    /// The event goes to every currently open connection, minus `exclude`.
    /// The live map is re-read on every call, never a cached list.
    fn broadcast_targets(
        state: &GatewayState,
        event: ServerEvent,
        exclude: Option<&ConnectionId>,
    ) -> Vec<(ConnectionHandle, ServerEvent)> {
        state
            .connections
            .iter()
            .filter(|(id, _)| exclude != Some(*id))
            .map(|(_, handle)| (handle.clone(), event.clone()))
            .collect()
    }

    /// Deliver events outside the lock, isolating per-recipient failures.
    fn fan_out(recipients: Vec<(ConnectionHandle, ServerEvent)>) {
        for (handle, event) in recipients {
            if let Err(e) = handle.deliver(event) {
                // A dead or backed-up recipient never aborts the fan-out.
                warn!(error = %e, "Dropped outbound event for one recipient");
            }
        }
    }
}

/// Statistics snapshot for health reporting.
#[derive(Debug, Clone, Copy)]
pub struct GatewayStats {
    /// Open connections, joined or not.
    pub open_connections: usize,
    /// Joined participants.
    pub joined_participants: usize,
}

/// RFC 3339 UTC timestamp with millisecond precision.
fn server_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_protocol::ServerEvent;
    use tokio::sync::mpsc;

    fn open(gateway: &RelayGateway, id: &str) -> mpsc::Receiver<ServerEvent> {
        let (handle, rx) = ConnectionHandle::channel(16);
        gateway.connect(id.into(), handle);
        rx
    }

    fn join(gateway: &RelayGateway, id: &str, name: &str) {
        gateway.dispatch(&id.into(), ClientEvent::join(name));
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_join_broadcast_exclusivity() {
        let gateway = RelayGateway::new();
        let mut rx_a = open(&gateway, "conn-a");
        let mut rx_b = open(&gateway, "conn-b");

        join(&gateway, "conn-a", "alice");

        // Sender gets exactly one `joined` and no `userJoined` about itself.
        assert_eq!(drain(&mut rx_a), vec![ServerEvent::joined("alice", 1)]);
        // The other open connection gets exactly one `userJoined`.
        assert_eq!(drain(&mut rx_b), vec![ServerEvent::user_joined("alice", 1)]);
    }

    #[test]
    fn test_presence_consistency() {
        let gateway = RelayGateway::new();
        let _rx_a = open(&gateway, "conn-a");
        let _rx_b = open(&gateway, "conn-b");
        let _rx_c = open(&gateway, "conn-c");

        assert_eq!(gateway.online_count(), 0);

        join(&gateway, "conn-a", "alice");
        join(&gateway, "conn-b", "bob");
        assert_eq!(gateway.online_count(), 2);

        gateway.disconnect(&"conn-a".into());
        assert_eq!(gateway.online_count(), 1);

        // Unjoined disconnect does not touch the count.
        gateway.disconnect(&"conn-c".into());
        assert_eq!(gateway.online_count(), 1);
    }

    #[test]
    fn test_message_fan_out_includes_sender() {
        let gateway = RelayGateway::new();
        let mut rx_a = open(&gateway, "conn-a");
        let mut rx_b = open(&gateway, "conn-b");
        join(&gateway, "conn-a", "alice");
        join(&gateway, "conn-b", "bob");
        drain(&mut rx_a);
        drain(&mut rx_b);

        gateway.dispatch(&"conn-a".into(), ClientEvent::message("hi"));

        for rx in [&mut rx_a, &mut rx_b] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            match &events[0] {
                ServerEvent::Message {
                    display_name,
                    text,
                    timestamp,
                } => {
                    assert_eq!(display_name, "alice");
                    assert_eq!(text, "hi");
                    assert!(timestamp.ends_with('Z'));
                }
                other => panic!("Expected message event, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_message_name_resolved_from_registry() {
        let gateway = RelayGateway::new();
        let mut rx_a = open(&gateway, "conn-a");
        join(&gateway, "conn-a", "alice");
        drain(&mut rx_a);

        gateway.dispatch(&"conn-a".into(), ClientEvent::message("hello"));

        match &drain(&mut rx_a)[0] {
            ServerEvent::Message { display_name, .. } => assert_eq!(display_name, "alice"),
            other => panic!("Expected message event, got {:?}", other),
        }
    }

    #[test]
    fn test_typing_excludes_sender() {
        let gateway = RelayGateway::new();
        let mut rx_a = open(&gateway, "conn-a");
        let mut rx_b = open(&gateway, "conn-b");
        join(&gateway, "conn-a", "alice");
        join(&gateway, "conn-b", "bob");
        drain(&mut rx_a);
        drain(&mut rx_b);

        gateway.dispatch(&"conn-a".into(), ClientEvent::typing(true));

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec![ServerEvent::typing("alice", true)]);
    }

    #[test]
    fn test_pre_join_silence() {
        let gateway = RelayGateway::new();
        let mut rx_a = open(&gateway, "conn-a");
        let mut rx_b = open(&gateway, "conn-b");
        join(&gateway, "conn-b", "bob");
        drain(&mut rx_a);
        drain(&mut rx_b);

        gateway.dispatch(&"conn-a".into(), ClientEvent::message("ignored"));
        gateway.dispatch(&"conn-a".into(), ClientEvent::typing(true));

        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(gateway.online_count(), 1);
    }

    #[test]
    fn test_leave_cleanup() {
        let gateway = RelayGateway::new();
        let mut rx_a = open(&gateway, "conn-a");
        let mut rx_b = open(&gateway, "conn-b");
        join(&gateway, "conn-a", "alice");
        join(&gateway, "conn-b", "bob");
        drain(&mut rx_a);
        drain(&mut rx_b);

        let left = gateway.disconnect(&"conn-b".into()).unwrap();
        assert_eq!(left.display_name, "bob");

        // Post-removal count.
        assert_eq!(drain(&mut rx_a), vec![ServerEvent::user_left("bob", 1)]);
        assert_eq!(gateway.participants().len(), 1);
    }

    #[test]
    fn test_unjoined_disconnect_is_silent() {
        let gateway = RelayGateway::new();
        let mut rx_a = open(&gateway, "conn-a");
        let _rx_b = open(&gateway, "conn-b");
        join(&gateway, "conn-a", "alice");
        drain(&mut rx_a);

        assert!(gateway.disconnect(&"conn-b".into()).is_none());
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn test_duplicate_join_overwrites_silently() {
        let gateway = RelayGateway::new();
        let mut rx_a = open(&gateway, "conn-a");
        let mut rx_b = open(&gateway, "conn-b");
        join(&gateway, "conn-a", "alice");
        join(&gateway, "conn-b", "bob");
        drain(&mut rx_a);
        drain(&mut rx_b);

        join(&gateway, "conn-a", "alicia");

        // Nothing is re-broadcast; peers keep the old name.
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(gateway.online_count(), 2);

        // The registry has the new name.
        let participants = gateway.participants();
        let renamed = participants
            .iter()
            .find(|p| p.connection_id == "conn-a".into())
            .unwrap();
        assert_eq!(renamed.display_name, "alicia");
    }

    #[test]
    fn test_join_from_unknown_connection_dropped() {
        let gateway = RelayGateway::new();
        let mut rx_a = open(&gateway, "conn-a");

        gateway.dispatch(&"never-connected".into(), ClientEvent::join("ghost"));

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(gateway.online_count(), 0);
    }

    #[test]
    fn test_unjoined_connection_receives_broadcasts() {
        let gateway = RelayGateway::new();
        let mut rx_a = open(&gateway, "conn-a");
        let mut rx_b = open(&gateway, "conn-b");
        join(&gateway, "conn-a", "alice");
        drain(&mut rx_a);
        drain(&mut rx_b);

        gateway.dispatch(&"conn-a".into(), ClientEvent::message("hi"));

        // conn-b never joined but is an open connection.
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[test]
    fn test_fan_out_isolates_dead_recipient() {
        let gateway = RelayGateway::new();
        let mut rx_a = open(&gateway, "conn-a");
        let rx_b = open(&gateway, "conn-b");
        let mut rx_c = open(&gateway, "conn-c");
        join(&gateway, "conn-a", "alice");
        join(&gateway, "conn-b", "bob");
        join(&gateway, "conn-c", "carol");
        drain(&mut rx_a);
        drain(&mut rx_c);

        // conn-b's transport task is gone but disconnect has not fired yet.
        drop(rx_b);

        gateway.dispatch(&"conn-a".into(), ClientEvent::message("still delivered"));

        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(drain(&mut rx_c).len(), 1);
    }

    #[test]
    fn test_stats() {
        let gateway = RelayGateway::new();
        let _rx_a = open(&gateway, "conn-a");
        let _rx_b = open(&gateway, "conn-b");
        join(&gateway, "conn-a", "alice");

        let stats = gateway.stats();
        assert_eq!(stats.open_connections, 2);
        assert_eq!(stats.joined_participants, 1);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let gateway = RelayGateway::new();
        let mut rx_a = open(&gateway, "conn-a");
        join(&gateway, "conn-a", "alice");
        assert_eq!(drain(&mut rx_a), vec![ServerEvent::joined("alice", 1)]);

        let mut rx_b = open(&gateway, "conn-b");
        join(&gateway, "conn-b", "bob");
        assert_eq!(drain(&mut rx_b), vec![ServerEvent::joined("bob", 2)]);
        assert_eq!(drain(&mut rx_a), vec![ServerEvent::user_joined("bob", 2)]);

        gateway.dispatch(&"conn-a".into(), ClientEvent::message("hi"));
        for rx in [&mut rx_a, &mut rx_b] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            assert!(matches!(
                &events[0],
                ServerEvent::Message { display_name, text, .. }
                    if display_name == "alice" && text == "hi"
            ));
        }

        gateway.disconnect(&"conn-b".into());
        assert_eq!(drain(&mut rx_a), vec![ServerEvent::user_left("bob", 1)]);
    }
}
