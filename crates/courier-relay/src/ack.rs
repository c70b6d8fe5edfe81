//! Last inbound event per participant, and waiting for acknowledgments.
//!
//! Each participant has a slot holding the most recent event it sent
//! (last-write-wins) and a sequence number bumped on every record. The
//! latest occurrence of each `*_received` event is kept separately so a
//! later, unrelated event cannot overwrite an acknowledgment a delivery is
//! about to observe.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use courier_core::events::EventName;
use courier_core::ids::ParticipantId;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::Instant;

/// One recorded inbound event.
#[derive(Clone, Debug, PartialEq)]
pub struct Observed {
    /// Event name.
    pub event: EventName,
    /// Payload as received.
    pub payload: Value,
    /// Position in the participant's record sequence (starts at 1).
    pub seq: u64,
}

#[derive(Default)]
struct SlotState {
    seq: u64,
    last: Option<Observed>,
    acks: HashMap<EventName, Observed>,
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    changed: Notify,
}

/// Per-participant record of the most recent inbound event.
#[derive(Default)]
pub struct AckTracker {
    slots: DashMap<ParticipantId, Arc<Slot>>,
}

impl AckTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, participant: &ParticipantId) -> Arc<Slot> {
        if let Some(slot) = self.slots.get(participant) {
            return slot.value().clone();
        }
        self.slots
            .entry(participant.clone())
            .or_default()
            .value()
            .clone()
    }

    /// Overwrite the last-seen event of `participant` and wake waiters.
    pub fn record(&self, participant: &ParticipantId, event: EventName, payload: Value) {
        let slot = self.slot(participant);
        {
            let mut state = slot.state.lock();
            state.seq += 1;
            let observed = Observed {
                event,
                payload,
                seq: state.seq,
            };
            if event.is_acknowledgment() {
                let _ = state.acks.insert(event, observed.clone());
            }
            state.last = Some(observed);
        }
        slot.changed.notify_waiters();
    }

    /// Last event recorded for `participant`.
    pub fn peek(&self, participant: &ParticipantId) -> Option<(EventName, Value)> {
        let slot = self.slots.get(participant)?.value().clone();
        let state = slot.state.lock();
        state.last.as_ref().map(|o| (o.event, o.payload.clone()))
    }

    /// Current sequence number of `participant` (0 if nothing recorded).
    ///
    /// Take a cursor before pushing, then pass it to
    /// [`wait_for`](Self::wait_for) so only acknowledgments recorded after
    /// the push count.
    pub fn cursor(&self, participant: &ParticipantId) -> u64 {
        self.slots
            .get(participant)
            .map_or(0, |slot| slot.value().state.lock().seq)
    }

    /// Wait up to `timeout` for `ack` from `participant` recorded after `since`.
    pub async fn wait_for(
        &self,
        participant: &ParticipantId,
        ack: EventName,
        since: u64,
        timeout: Duration,
    ) -> Option<Observed> {
        let slot = self.slot(participant);
        // `None` means the timeout is past the clock's range: wait unbounded.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let notified = slot.changed.notified();
            tokio::pin!(notified);
            // Register before checking so a record between the check and the
            // await is not missed.
            let _ = notified.as_mut().enable();

            let hit = slot
                .state
                .lock()
                .acks
                .get(&ack)
                .filter(|o| o.seq > since)
                .cloned();
            if hit.is_some() {
                return hit;
            }
            match deadline {
                Some(at) => {
                    if tokio::time::timeout_at(at, notified).await.is_err() {
                        return None;
                    }
                }
                None => notified.await,
            }
        }
    }
}
