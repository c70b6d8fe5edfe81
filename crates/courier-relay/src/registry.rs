//! Participant ↔ connection bindings.

use std::collections::HashMap;
use std::sync::Arc;

use courier_core::ids::{ConnectionId, ParticipantId};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::connection::ClientConnection;

#[derive(Default)]
struct Bindings {
    by_participant: HashMap<ParticipantId, Arc<ClientConnection>>,
    by_connection: HashMap<ConnectionId, ParticipantId>,
}

/// Bidirectional map between participants and their current connection.
///
/// Both directions live under one lock so they never disagree: a connection
/// is bound to at most one participant and vice versa.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Bindings>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `participant` to `connection`.
    ///
    /// A previous connection of the same participant is superseded and
    /// returned. If `connection` was bound to another participant, that
    /// binding is dropped.
    pub fn register(
        &self,
        participant: ParticipantId,
        connection: Arc<ClientConnection>,
    ) -> Option<Arc<ClientConnection>> {
        let mut inner = self.inner.lock();

        if let Some(prior) = inner.by_connection.get(&connection.id).cloned() {
            if prior != participant {
                let _ = inner.by_participant.remove(&prior);
                debug!(
                    connection_id = %connection.id,
                    from = %prior,
                    to = %participant,
                    "connection rebound to another participant"
                );
            }
        }

        let _ = inner
            .by_connection
            .insert(connection.id.clone(), participant.clone());
        let superseded = inner
            .by_participant
            .insert(participant.clone(), connection.clone())
            .filter(|old| old.id != connection.id);

        if let Some(old) = &superseded {
            let _ = inner.by_connection.remove(&old.id);
            info!(
                participant = %participant,
                old = %old.id,
                new = %connection.id,
                "participant reconnected on a new connection"
            );
        }
        superseded
    }

    /// Remove the bindings of `connection`.
    ///
    /// Returns the participant that was bound to it. A connection that was
    /// superseded or never bound is a no-op.
    pub fn unregister(&self, connection: &ConnectionId) -> Option<ParticipantId> {
        let mut inner = self.inner.lock();
        let participant = inner.by_connection.remove(connection)?;
        let current = inner
            .by_participant
            .get(&participant)
            .is_some_and(|c| &c.id == connection);
        if current {
            let _ = inner.by_participant.remove(&participant);
        }
        Some(participant)
    }

    /// Current connection of `participant`.
    pub fn resolve(&self, participant: &ParticipantId) -> Option<Arc<ClientConnection>> {
        self.inner.lock().by_participant.get(participant).cloned()
    }

    /// Participant bound to `connection`.
    pub fn participant_of(&self, connection: &ConnectionId) -> Option<ParticipantId> {
        self.inner.lock().by_connection.get(connection).cloned()
    }

    /// Number of bound participants.
    pub fn len(&self) -> usize {
        self.inner.lock().by_participant.len()
    }

    /// Whether no participant is bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::make_connection;

    #[test]
    fn register_and_resolve() {
        let reg = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        assert!(reg.register("w1".into(), conn.clone()).is_none());
        assert_eq!(reg.resolve(&"w1".into()).unwrap().id, conn.id);
        assert_eq!(reg.participant_of(&conn.id), Some("w1".into()));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn resolve_unknown_is_none() {
        let reg = ConnectionRegistry::new();
        assert!(reg.resolve(&"ghost".into()).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn register_same_connection_twice_is_idempotent() {
        let reg = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        let _ = reg.register("w1".into(), conn.clone());
        assert!(reg.register("w1".into(), conn.clone()).is_none());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.participant_of(&conn.id), Some("w1".into()));
    }

    #[test]
    fn reconnect_supersedes_old_handle() {
        let reg = ConnectionRegistry::new();
        let (old, _rx1) = make_connection("c_old");
        let (new, _rx2) = make_connection("c_new");
        let _ = reg.register("w1".into(), old.clone());
        let superseded = reg.register("w1".into(), new.clone()).unwrap();
        assert_eq!(superseded.id, old.id);
        assert_eq!(reg.resolve(&"w1".into()).unwrap().id, new.id);
        assert!(reg.participant_of(&old.id).is_none());
    }

    #[test]
    fn late_disconnect_of_superseded_handle_keeps_new_binding() {
        let reg = ConnectionRegistry::new();
        let (old, _rx1) = make_connection("c_old");
        let (new, _rx2) = make_connection("c_new");
        let _ = reg.register("w1".into(), old.clone());
        let _ = reg.register("w1".into(), new.clone());

        assert!(reg.unregister(&old.id).is_none());
        assert_eq!(reg.resolve(&"w1".into()).unwrap().id, new.id);
    }

    #[test]
    fn unregister_removes_both_directions() {
        let reg = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        let _ = reg.register("w1".into(), conn.clone());
        assert_eq!(reg.unregister(&conn.id), Some("w1".into()));
        assert!(reg.resolve(&"w1".into()).is_none());
        assert!(reg.participant_of(&conn.id).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let reg = ConnectionRegistry::new();
        assert!(reg.unregister(&"nope".into()).is_none());
    }

    #[test]
    fn rebinding_connection_to_other_participant() {
        let reg = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        let _ = reg.register("w1".into(), conn.clone());
        let _ = reg.register("w2".into(), conn.clone());
        assert!(reg.resolve(&"w1".into()).is_none());
        assert_eq!(reg.resolve(&"w2".into()).unwrap().id, conn.id);
        assert_eq!(reg.len(), 1);
    }
}
