//! Applies inbound frames to relay state.
//!
//! Handlers never wait. Anything that needs an acknowledgment from another
//! participant is handed to the [`DeliveryCoordinator`], and the sender's
//! `ack` frame is written from the completion callback. This keeps a
//! socket's read loop free to receive the very `*_received` event its own
//! delivery is waiting for.

use std::sync::Arc;

use courier_core::errors::FrameError;
use courier_core::events::{DeliveryKind, EventName, InboundEvent};
use courier_core::frames::{InboundFrame, OutboundFrame};
use courier_core::ids::{ConnectionId, IdempotencyId, ParticipantId};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ack::AckTracker;
use crate::connection::ClientConnection;
use crate::coordinator::DeliveryCoordinator;
use crate::dedup::{Admission, DedupStore, Waiter};
use crate::metrics::{RELAY_DEDUP_HITS_TOTAL, RELAY_FRAMES_REJECTED_TOTAL};
use crate::registry::ConnectionRegistry;

/// Per-event handlers shared by every socket.
pub struct SessionEndpoint {
    registry: Arc<ConnectionRegistry>,
    dedup: Arc<DedupStore>,
    acks: Arc<AckTracker>,
    coordinator: Arc<DeliveryCoordinator>,
    world: ParticipantId,
}

impl SessionEndpoint {
    /// Create an endpoint over shared relay state.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        dedup: Arc<DedupStore>,
        acks: Arc<AckTracker>,
        coordinator: Arc<DeliveryCoordinator>,
    ) -> Self {
        Self {
            registry,
            dedup,
            acks,
            coordinator,
            world: ParticipantId::world(),
        }
    }

    /// Decode and apply one text frame received on `conn`.
    pub fn handle_text(&self, conn: &Arc<ClientConnection>, text: &str) {
        match InboundFrame::decode(text) {
            Ok(frame) => self.handle(conn, frame),
            Err(e) => reject(conn, None, &e),
        }
    }

    /// Apply a decoded frame received on `conn`.
    ///
    /// Malformed frames are answered with an `error` frame and leave all
    /// state untouched.
    pub fn handle(&self, conn: &Arc<ClientConnection>, frame: InboundFrame) {
        let event = match frame.event() {
            Ok(event) => event,
            Err(e) => return reject(conn, frame.ack_id, &e),
        };
        let InboundFrame { data, ack_id, .. } = frame;
        let name = event.name();
        debug!(connection_id = %conn.id, event = %name, "applying inbound event");

        match event {
            InboundEvent::Alive { by } => self.on_alive(conn, by, data, ack_id),
            InboundEvent::Send {
                kind,
                receiver,
                idempotency_id,
            } => {
                if let Some(sender) = self.registry.participant_of(&conn.id) {
                    self.acks.record(&sender, name, data.clone());
                }
                self.on_send(conn, kind, &receiver, idempotency_id, data, ack_id);
            }
            InboundEvent::Received { event, by } => {
                self.acks.record(&by, event, data);
                complete(conn, ack_id, None);
            }
        }
    }

    /// Drop the bindings of a closed connection.
    ///
    /// Deliveries already queued for its participant keep retrying until it
    /// reconnects; dedup and tracker state is retained.
    pub fn connection_closed(&self, conn: &ConnectionId) {
        if let Some(participant) = self.registry.unregister(conn) {
            info!(participant = %participant, connection_id = %conn, "participant disconnected");
        }
    }

    fn on_alive(
        &self,
        conn: &Arc<ClientConnection>,
        by: ParticipantId,
        data: Value,
        ack_id: Option<u64>,
    ) {
        let _ = self.registry.register(by.clone(), conn.clone());
        self.acks.record(&by, EventName::AgentAlive, data.clone());

        if by.is_world() {
            debug!(connection_id = %conn.id, "world is alive");
            complete(conn, ack_id, Some(data));
            return;
        }

        let reply = conn.clone();
        let participant = by.clone();
        let queued = self.coordinator.deliver_then(
            &self.world,
            EventName::AgentAlive,
            data,
            move |outcome| match outcome {
                Ok(world_ack) => complete(&reply, ack_id, Some(world_ack)),
                Err(e) => debug!(participant = %participant, error = %e, "alive not forwarded"),
            },
        );
        if !queued {
            debug!(participant = %by, "world not connected, alive not forwarded");
        }
    }

    fn on_send(
        &self,
        conn: &Arc<ClientConnection>,
        kind: DeliveryKind,
        receiver: &ParticipantId,
        id: IdempotencyId,
        data: Value,
        ack_id: Option<u64>,
    ) {
        let repeat = Waiter {
            conn: conn.clone(),
            ack_id,
        };
        match self.dedup.admit(kind, &id, repeat) {
            Admission::Delivered => {
                counter!(RELAY_DEDUP_HITS_TOTAL, "kind" => kind.as_str()).increment(1);
                debug!(kind = kind.as_str(), id = %id, "already delivered, acknowledging");
                complete(conn, ack_id, None);
            }
            Admission::InFlight => {
                counter!(RELAY_DEDUP_HITS_TOTAL, "kind" => kind.as_str()).increment(1);
                debug!(kind = kind.as_str(), id = %id, "delivery in progress, parking repeat");
            }
            Admission::Fresh => {
                let dedup = self.dedup.clone();
                let reply = conn.clone();
                let original = data.clone();
                let claim_id = id.clone();
                let queued = self.coordinator.deliver_then(
                    receiver,
                    kind.forward_event(),
                    data,
                    move |outcome| match outcome {
                        Ok(_) => {
                            let parked = dedup.settle(kind, &claim_id);
                            complete(&reply, ack_id, Some(original));
                            for repeat in parked {
                                complete(&repeat.conn, repeat.ack_id, None);
                            }
                        }
                        Err(e) => {
                            let dropped = dedup.abandon(kind, &claim_id);
                            warn!(
                                kind = kind.as_str(),
                                id = %claim_id,
                                unanswered_repeats = dropped,
                                error = %e,
                                "delivery failed"
                            );
                        }
                    },
                );
                if !queued {
                    let _ = self.dedup.abandon(kind, &id);
                    debug!(receiver = %receiver, id = %id, "receiver not connected, dropping send");
                }
            }
        }
    }
}

fn complete(conn: &ClientConnection, ack_id: Option<u64>, data: Option<Value>) {
    if let Some(ack_id) = ack_id {
        let _ = conn.send_frame(&OutboundFrame::ack(ack_id, data));
    }
}

fn reject(conn: &ClientConnection, ack_id: Option<u64>, err: &FrameError) {
    counter!(RELAY_FRAMES_REJECTED_TOTAL, "code" => err.code()).increment(1);
    warn!(connection_id = %conn.id, code = err.code(), error = %err, "rejected inbound frame");
    let _ = conn.send_frame(&OutboundFrame::error(ack_id, err));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::{make_connection, next_frame};
    use crate::coordinator::DeliveryPolicy;
    use std::time::Duration;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    const WAIT: Duration = Duration::from_secs(30);

    struct Harness {
        registry: Arc<ConnectionRegistry>,
        dedup: Arc<DedupStore>,
        acks: Arc<AckTracker>,
        endpoint: SessionEndpoint,
    }

    fn harness() -> Harness {
        let registry = Arc::new(ConnectionRegistry::new());
        let dedup = Arc::new(DedupStore::new());
        let acks = Arc::new(AckTracker::new());
        let coordinator = Arc::new(DeliveryCoordinator::new(
            registry.clone(),
            acks.clone(),
            DeliveryPolicy::default(),
            CancellationToken::new(),
        ));
        let endpoint =
            SessionEndpoint::new(registry.clone(), dedup.clone(), acks.clone(), coordinator);
        Harness {
            registry,
            dedup,
            acks,
            endpoint,
        }
    }

    fn send(h: &Harness, conn: &Arc<ClientConnection>, event: &str, data: Value, ack_id: u64) {
        h.endpoint.handle(
            conn,
            InboundFrame {
                event: event.to_owned(),
                data,
                ack_id: Some(ack_id),
            },
        );
    }

    async fn recv_frame(rx: &mut mpsc::Receiver<Arc<String>>) -> OutboundFrame {
        let json = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("channel closed");
        serde_json::from_str(&json).unwrap()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    /// World and `w1` connected and announced.
    async fn world_and_worker(
        h: &Harness,
    ) -> (
        (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>),
        (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>),
    ) {
        let (world, mut world_rx) = make_connection("c_world");
        let (w1, mut w1_rx) = make_connection("c_w1");

        send(h, &world, "agent_alive", json!({"by_worker_id": "[World]"}), 1);
        assert_eq!(recv_frame(&mut world_rx).await.event, "ack");

        send(h, &w1, "agent_alive", json!({"by_worker_id": "w1"}), 1);
        let forwarded = recv_frame(&mut world_rx).await;
        assert_eq!(forwarded.event, "agent_alive");
        send(h, &world, "agent_alive_received", json!({"by_worker_id": "[World]"}), 2);
        assert_eq!(recv_frame(&mut world_rx).await.event, "ack");
        assert_eq!(recv_frame(&mut w1_rx).await.event, "ack");

        ((world, world_rx), (w1, w1_rx))
    }

    #[tokio::test(start_paused = true)]
    async fn world_alive_acks_immediately_with_own_payload() {
        let h = harness();
        let (world, mut rx) = make_connection("c_world");
        send(&h, &world, "agent_alive", json!({"by_worker_id": "[World]", "x": 1}), 5);

        let ack = next_frame(&mut rx).unwrap();
        assert_eq!(ack, OutboundFrame::ack(5, Some(json!({"by_worker_id": "[World]", "x": 1}))));
        assert_eq!(h.registry.resolve(&ParticipantId::world()).unwrap().id, world.id);
        assert_eq!(
            h.acks.peek(&ParticipantId::world()).unwrap().0,
            EventName::AgentAlive
        );
    }

    #[tokio::test(start_paused = true)]
    async fn worker_alive_acked_with_world_acknowledgment() {
        let h = harness();
        let ((_world, _world_rx), (_w1, _w1_rx)) = world_and_worker(&h).await;
        assert!(h.registry.resolve(&"w1".into()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn alive_before_world_waits_for_world() {
        let h = harness();
        let (w2, mut w2_rx) = make_connection("c_w2");
        send(&h, &w2, "agent_alive", json!({"by_worker_id": "w2"}), 1);
        settle().await;
        // World absent: registered, but no forward and no ack
        assert!(h.registry.resolve(&"w2".into()).is_some());
        assert!(next_frame(&mut w2_rx).is_none());

        let (world, mut world_rx) = make_connection("c_world");
        send(&h, &world, "agent_alive", json!({"by_worker_id": "[World]"}), 1);
        assert_eq!(recv_frame(&mut world_rx).await.event, "ack");

        // the worker renews liveness once the World is up
        send(&h, &w2, "agent_alive", json!({"by_worker_id": "w2"}), 2);
        let forwarded = recv_frame(&mut world_rx).await;
        assert_eq!(forwarded.event, "agent_alive");
        assert_eq!(forwarded.data["by_worker_id"], "w2");
        send(&h, &world, "agent_alive_received", json!({"by_worker_id": "[World]"}), 2);

        let ack = recv_frame(&mut w2_rx).await;
        assert_eq!(ack.ack_id, Some(2));
        assert_eq!(ack.data["by_worker_id"], "[World]");
    }

    #[tokio::test(start_paused = true)]
    async fn command_delivered_once_and_duplicate_acked() {
        let h = harness();
        let ((world, mut world_rx), (w1, mut w1_rx)) = world_and_worker(&h).await;

        let cmd = json!({"receiver_worker_id": "[World]", "command_id": "c1", "text": "go"});
        send(&h, &w1, "agent_send_command", cmd.clone(), 10);

        let pushed = recv_frame(&mut world_rx).await;
        assert_eq!(pushed, OutboundFrame::push(EventName::NewCommand, cmd.clone()));
        settle().await;
        assert!(next_frame(&mut w1_rx).is_none());

        send(&h, &world, "new_command_received", json!({"by_worker_id": "[World]"}), 3);
        assert_eq!(recv_frame(&mut world_rx).await, OutboundFrame::ack(3, None));
        let ack = recv_frame(&mut w1_rx).await;
        assert_eq!(ack, OutboundFrame::ack(10, Some(cmd.clone())));
        assert!(h.dedup.is_claimed(DeliveryKind::Command, &"c1".into()));

        send(&h, &w1, "agent_send_command", cmd, 11);
        assert_eq!(next_frame(&mut w1_rx).unwrap(), OutboundFrame::ack(11, None));
        settle().await;
        assert!(next_frame(&mut world_rx).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_while_in_flight_is_forwarded_once_and_acked_twice() {
        let h = harness();
        let ((world, mut world_rx), (w1, mut w1_rx)) = world_and_worker(&h).await;

        let msg = json!({"receiver_worker_id": "[World]", "message_id": "m1"});
        send(&h, &w1, "agent_send_message", msg.clone(), 20);
        send(&h, &w1, "agent_send_message", msg.clone(), 21);

        let pushed = recv_frame(&mut world_rx).await;
        assert_eq!(pushed.event, "new_message");
        settle().await;
        assert!(next_frame(&mut world_rx).is_none());
        assert!(next_frame(&mut w1_rx).is_none());

        send(&h, &world, "new_message_received", json!({"by_worker_id": "[World]"}), 4);
        assert_eq!(recv_frame(&mut world_rx).await, OutboundFrame::ack(4, None));
        assert_eq!(recv_frame(&mut w1_rx).await, OutboundFrame::ack(20, Some(msg.clone())));
        assert_eq!(recv_frame(&mut w1_rx).await, OutboundFrame::ack(21, None));

        // no second push, not even after a retry window
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(next_frame(&mut world_rx).is_none());

        send(&h, &w1, "agent_send_message", msg, 22);
        assert_eq!(next_frame(&mut w1_rx).unwrap(), OutboundFrame::ack(22, None));
    }

    #[tokio::test(start_paused = true)]
    async fn repeat_from_another_connection_is_acked_on_its_own_connection() {
        let h = harness();
        let ((world, mut world_rx), (w1, mut w1_rx)) = world_and_worker(&h).await;
        let (w1_again, mut again_rx) = make_connection("c_w1_again");

        let cmd = json!({"receiver_worker_id": "[World]", "command_id": "c7"});
        send(&h, &w1, "agent_send_command", cmd.clone(), 1);
        let _ = recv_frame(&mut world_rx).await;
        send(&h, &w1_again, "agent_send_command", cmd, 2);

        send(&h, &world, "new_command_received", json!({"by_worker_id": "[World]"}), 5);
        assert_eq!(recv_frame(&mut w1_rx).await.ack_id, Some(1));
        assert_eq!(recv_frame(&mut again_rx).await, OutboundFrame::ack(2, None));
        settle().await;
        assert!(next_frame(&mut w1_rx).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn send_to_absent_receiver_is_dropped_and_retryable() {
        let h = harness();
        let ((_world, _world_rx), (w1, mut w1_rx)) = world_and_worker(&h).await;

        let msg = json!({"receiver_worker_id": "w9", "message_id": "m9"});
        send(&h, &w1, "agent_send_message", msg.clone(), 30);
        settle().await;
        assert!(next_frame(&mut w1_rx).is_none());
        assert!(!h.dedup.is_claimed(DeliveryKind::Message, &"m9".into()));

        let (w9, mut w9_rx) = make_connection("c_w9");
        let _ = h.registry.register("w9".into(), w9.clone());
        send(&h, &w1, "agent_send_message", msg, 31);
        assert_eq!(recv_frame(&mut w9_rx).await.event, "new_message");
    }

    #[tokio::test(start_paused = true)]
    async fn received_records_and_acks_without_payload() {
        let h = harness();
        let (w1, mut rx) = make_connection("c_w1");
        send(&h, &w1, "new_message_received", json!({"by_worker_id": "w1", "n": 7}), 8);

        assert_eq!(next_frame(&mut rx).unwrap(), OutboundFrame::ack(8, None));
        let (event, payload) = h.acks.peek(&"w1".into()).unwrap();
        assert_eq!(event, EventName::NewMessageReceived);
        assert_eq!(payload["n"], 7);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_without_ack_id_get_no_ack() {
        let h = harness();
        let (w1, mut rx) = make_connection("c_w1");
        h.endpoint
            .handle_text(&w1, r#"{"event":"new_command_received","data":{"by_worker_id":"w1"}}"#);
        assert!(next_frame(&mut rx).is_none());
        assert!(h.acks.peek(&"w1".into()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_rejected_without_state_change() {
        let h = harness();
        let (conn, mut rx) = make_connection("c_bad");

        h.endpoint.handle_text(&conn, "not json");
        let err = next_frame(&mut rx).unwrap();
        assert_eq!(err.event, "error");
        assert_eq!(err.data["code"], "INVALID_JSON");
        assert!(err.ack_id.is_none());

        send(&h, &conn, "agent_alive", json!({}), 3);
        let err = next_frame(&mut rx).unwrap();
        assert_eq!(err.ack_id, Some(3));
        assert_eq!(err.data["code"], "INVALID_PAYLOAD");

        send(&h, &conn, "new_command", json!({"by_worker_id": "x"}), 4);
        assert_eq!(next_frame(&mut rx).unwrap().data["code"], "NOT_INBOUND");

        send(&h, &conn, "agent_explode", json!({}), 5);
        assert_eq!(next_frame(&mut rx).unwrap().data["code"], "UNKNOWN_EVENT");

        assert!(h.registry.is_empty());
        assert!(h.registry.participant_of(&conn.id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_unbinds_but_keeps_dedup() {
        let h = harness();
        let ((world, mut world_rx), (w1, mut w1_rx)) = world_and_worker(&h).await;

        let msg = json!({"receiver_worker_id": "[World]", "message_id": "m1"});
        send(&h, &w1, "agent_send_message", msg.clone(), 1);
        let _ = recv_frame(&mut world_rx).await;
        send(&h, &world, "new_message_received", json!({"by_worker_id": "[World]"}), 9);
        let _ = recv_frame(&mut w1_rx).await;

        h.endpoint.connection_closed(&w1.id);
        assert!(h.registry.resolve(&"w1".into()).is_none());
        assert!(h.dedup.is_claimed(DeliveryKind::Message, &"m1".into()));
        assert!(h.acks.peek(&"w1".into()).is_some());
    }
}
