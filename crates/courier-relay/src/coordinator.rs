//! Retry-until-acknowledged delivery, one in flight per participant.
//!
//! Every participant that is ever addressed gets a lane: an unbounded queue
//! drained by a dedicated task. The lane pushes the head delivery, waits for
//! the matching `*_received` event, and re-pushes on timeout until the
//! acknowledgment arrives. Only then does it move to the next queued
//! delivery, so a participant never has two unacknowledged pushes and
//! deliveries arrive in the order they were issued.
//!
//! Each attempt re-resolves the target. A participant that disconnects
//! mid-delivery keeps its place in line and receives the push again once it
//! reconnects.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use courier_core::events::EventName;
use courier_core::frames::OutboundFrame;
use courier_core::ids::ParticipantId;
use dashmap::DashMap;
use metrics::{counter, gauge};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ack::AckTracker;
use crate::errors::DeliveryError;
use crate::metrics::{
    RELAY_DELIVERIES_ACKNOWLEDGED_TOTAL, RELAY_DELIVERIES_IN_FLIGHT, RELAY_DELIVERIES_TOTAL,
    RELAY_DELIVERIES_UNRESOLVED_TOTAL, RELAY_DELIVERY_RETRIES_TOTAL,
};
use crate::registry::ConnectionRegistry;

/// Timing of acknowledgment waits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Polls per attempt before the push is repeated.
    pub ack_poll_attempts: u32,
    /// Interval between polls.
    pub ack_poll_interval: Duration,
    /// Attempt ceiling per delivery. `None` retries until acknowledged.
    pub max_attempts: Option<u32>,
}

impl DeliveryPolicy {
    /// How long one attempt waits for its acknowledgment.
    #[must_use]
    pub fn ack_timeout(&self) -> Duration {
        self.ack_poll_interval
            .checked_mul(self.ack_poll_attempts.max(1))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            ack_poll_attempts: 2,
            ack_poll_interval: Duration::from_millis(500),
            max_attempts: None,
        }
    }
}

/// How long a lane waits for work before checking whether it can retire.
const LANE_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

type Outcome = Result<Value, DeliveryError>;

/// A queued delivery. Resolves once the target acknowledges it.
#[derive(Debug)]
pub struct PendingDelivery {
    rx: oneshot::Receiver<Outcome>,
}

impl PendingDelivery {
    fn resolved(outcome: Outcome) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx }
    }

    /// Wait for the acknowledgment and return its payload.
    pub async fn acknowledged(self) -> Outcome {
        self.rx.await.unwrap_or(Err(DeliveryError::LaneClosed))
    }
}

struct Shared {
    registry: Arc<ConnectionRegistry>,
    acks: Arc<AckTracker>,
    policy: DeliveryPolicy,
    cancel: CancellationToken,
    in_flight: AtomicUsize,
    lanes: DashMap<ParticipantId, mpsc::UnboundedSender<Job>>,
}

/// Decrements the in-flight count when a job is resolved or dropped.
struct InFlight(Arc<Shared>);

impl InFlight {
    fn enter(shared: &Arc<Shared>) -> Self {
        let _ = shared.in_flight.fetch_add(1, Ordering::Relaxed);
        gauge!(RELAY_DELIVERIES_IN_FLIGHT).increment(1.0);
        Self(shared.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let _ = self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
        gauge!(RELAY_DELIVERIES_IN_FLIGHT).decrement(1.0);
    }
}

struct Job {
    event: EventName,
    ack: EventName,
    frame: Arc<String>,
    reply: oneshot::Sender<Outcome>,
    _in_flight: InFlight,
}

/// Serializes deliveries per participant and retries each until acknowledged.
///
/// A lane that has been idle for a while and whose participant has no live
/// connection is retired. The next delivery to that participant starts a new
/// one.
pub struct DeliveryCoordinator {
    shared: Arc<Shared>,
}

impl DeliveryCoordinator {
    /// Create a coordinator. Cancelling `cancel` resolves every pending
    /// delivery with [`DeliveryError::Cancelled`].
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        acks: Arc<AckTracker>,
        policy: DeliveryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                acks,
                policy,
                cancel,
                in_flight: AtomicUsize::new(0),
                lanes: DashMap::new(),
            }),
        }
    }

    /// Active policy.
    pub fn policy(&self) -> DeliveryPolicy {
        self.shared.policy
    }

    /// Deliveries queued or awaiting acknowledgment.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn lane_count(&self) -> usize {
        self.shared.lanes.len()
    }

    /// Queue `event` with `payload` for `target`.
    ///
    /// Returns `None` without queuing anything if `target` has no live
    /// connection. Must be called from within a Tokio runtime.
    pub fn deliver(
        &self,
        target: &ParticipantId,
        event: EventName,
        payload: Value,
    ) -> Option<PendingDelivery> {
        if self.shared.registry.resolve(target).is_none() {
            counter!(RELAY_DELIVERIES_UNRESOLVED_TOTAL).increment(1);
            debug!(participant = %target, %event, "target not connected, dropping delivery");
            return None;
        }
        let Some(ack) = event.received() else {
            return Some(PendingDelivery::resolved(Err(DeliveryError::NotAckable(
                event,
            ))));
        };
        if self.shared.cancel.is_cancelled() {
            return Some(PendingDelivery::resolved(Err(DeliveryError::Cancelled)));
        }
        let frame = match OutboundFrame::push(event, payload).encode() {
            Ok(json) => Arc::new(json),
            Err(e) => return Some(PendingDelivery::resolved(Err(e.into()))),
        };

        let (reply, rx) = oneshot::channel();
        let job = Job {
            event,
            ack,
            frame,
            reply,
            _in_flight: InFlight::enter(&self.shared),
        };
        counter!(RELAY_DELIVERIES_TOTAL, "event" => event.as_str()).increment(1);
        self.enqueue(target, job);
        Some(PendingDelivery { rx })
    }

    /// Queue a delivery and run `on_complete` with its outcome.
    ///
    /// Returns `false` (and never calls `on_complete`) if `target` has no
    /// live connection.
    pub fn deliver_then<F>(
        &self,
        target: &ParticipantId,
        event: EventName,
        payload: Value,
        on_complete: F,
    ) -> bool
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        let Some(pending) = self.deliver(target, event, payload) else {
            return false;
        };
        let _ = tokio::spawn(async move {
            on_complete(pending.acknowledged().await);
        });
        true
    }

    fn enqueue(&self, target: &ParticipantId, job: Job) {
        let mut lane = self
            .shared
            .lanes
            .entry(target.clone())
            .or_insert_with(|| spawn_lane(self.shared.clone(), target.clone()));
        if let Err(mpsc::error::SendError(job)) = lane.send(job) {
            let fresh = spawn_lane(self.shared.clone(), target.clone());
            // A job that still cannot be queued is dropped, which resolves it
            // as LaneClosed.
            let _ = fresh.send(job);
            *lane = fresh;
        }
    }
}

impl Drop for DeliveryCoordinator {
    fn drop(&mut self) {
        // Lanes hold `shared`; closing their senders lets them exit.
        self.shared.lanes.clear();
    }
}

fn spawn_lane(shared: Arc<Shared>, target: ParticipantId) -> mpsc::UnboundedSender<Job> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _ = tokio::spawn(run_lane(shared, target, rx));
    tx
}

async fn run_lane(shared: Arc<Shared>, target: ParticipantId, mut rx: mpsc::UnboundedReceiver<Job>) {
    debug!(participant = %target, "delivery lane started");
    loop {
        let job = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => return,
            },
            () = tokio::time::sleep(LANE_IDLE_TIMEOUT) => {
                if retire(&shared, &target, &rx) {
                    debug!(participant = %target, "delivery lane retired");
                    return;
                }
                continue;
            }
        };
        let outcome = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => Err(DeliveryError::Cancelled),
            outcome = until_acknowledged(&shared, &target, &job) => outcome,
        };
        let _ = job.reply.send(outcome);
    }

    rx.close();
    let mut drained = 0usize;
    while let Ok(job) = rx.try_recv() {
        let _ = job.reply.send(Err(DeliveryError::Cancelled));
        drained += 1;
    }
    debug!(participant = %target, drained, "delivery lane stopped");
}

/// Remove the lane's entry if nothing is queued and `target` is offline.
///
/// `enqueue` sends while holding the entry, so a job is either already in
/// `rx` here or goes to a freshly spawned lane.
fn retire(shared: &Shared, target: &ParticipantId, rx: &mpsc::UnboundedReceiver<Job>) -> bool {
    shared
        .lanes
        .remove_if(target, |_, _| {
            rx.is_empty() && shared.registry.resolve(target).is_none()
        })
        .is_some()
}

async fn until_acknowledged(shared: &Shared, target: &ParticipantId, job: &Job) -> Outcome {
    let timeout = shared.policy.ack_timeout();
    let mut attempt: u32 = 1;
    loop {
        let since = shared.acks.cursor(target);
        match shared.registry.resolve(target) {
            Some(conn) => {
                if !conn.send(job.frame.clone()) {
                    debug!(participant = %target, event = %job.event, attempt, "push not queued");
                }
            }
            None => {
                debug!(participant = %target, event = %job.event, attempt, "target offline, waiting");
            }
        }

        if let Some(observed) = shared.acks.wait_for(target, job.ack, since, timeout).await {
            counter!(RELAY_DELIVERIES_ACKNOWLEDGED_TOTAL, "event" => job.event.as_str())
                .increment(1);
            debug!(participant = %target, event = %job.event, attempt, "delivery acknowledged");
            return Ok(observed.payload);
        }

        if shared.policy.max_attempts.is_some_and(|max| attempt >= max) {
            warn!(participant = %target, event = %job.event, attempt, "giving up on delivery");
            return Err(DeliveryError::Exhausted { attempts: attempt });
        }
        counter!(RELAY_DELIVERY_RETRIES_TOTAL, "event" => job.event.as_str()).increment(1);
        warn!(participant = %target, event = %job.event, attempt, "no acknowledgment, resending");
        attempt = attempt.saturating_add(1);
    }
}
