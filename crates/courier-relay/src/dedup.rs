//! Idempotency ids of completed command and message deliveries.
//!
//! Records only grow: an id claimed once stays claimed until the process
//! exits. Senders that repeat an id while its first delivery is still
//! pending are parked on the id and released when it settles.

use std::sync::Arc;

use courier_core::events::DeliveryKind;
use courier_core::ids::IdempotencyId;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use crate::connection::ClientConnection;

/// Outcome of [`DedupStore::admit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// First sighting; the caller owns the delivery.
    Fresh,
    /// An earlier send of this id is still being delivered. The repeat
    /// sender was parked and is returned by [`DedupStore::settle`].
    InFlight,
    /// Already delivered; acknowledge without forwarding.
    Delivered,
}

/// A repeat sender waiting on the first delivery of its id.
#[derive(Clone, Debug)]
pub struct Waiter {
    /// Connection the repeat arrived on.
    pub conn: Arc<ClientConnection>,
    /// `ackId` of the repeat frame.
    pub ack_id: Option<u64>,
}

#[derive(Default)]
struct Partition {
    delivered: DashSet<IdempotencyId>,
    in_flight: DashMap<IdempotencyId, Vec<Waiter>>,
}

/// Completed idempotency ids, partitioned by delivery kind.
#[derive(Default)]
pub struct DedupStore {
    commands: Partition,
    messages: Partition,
}

impl DedupStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn partition(&self, kind: DeliveryKind) -> &Partition {
        match kind {
            DeliveryKind::Command => &self.commands,
            DeliveryKind::Message => &self.messages,
        }
    }

    /// Atomically claim `id`. Only the first caller for a given id gets `true`.
    pub fn try_claim(&self, kind: DeliveryKind, id: &IdempotencyId) -> bool {
        self.partition(kind).delivered.insert(id.clone())
    }

    /// Whether `id` has been claimed.
    pub fn is_claimed(&self, kind: DeliveryKind, id: &IdempotencyId) -> bool {
        self.partition(kind).delivered.contains(id)
    }

    /// Decide what to do with an incoming send of `id` from `sender`.
    ///
    /// A `Fresh` admission must be followed by [`settle`](Self::settle) on
    /// success or [`abandon`](Self::abandon) on failure. On `InFlight` the
    /// sender is kept until then.
    pub fn admit(&self, kind: DeliveryKind, id: &IdempotencyId, sender: Waiter) -> Admission {
        let p = self.partition(kind);
        if p.delivered.contains(id) {
            return Admission::Delivered;
        }
        match p.in_flight.entry(id.clone()) {
            Entry::Occupied(mut parked) => {
                parked.get_mut().push(sender);
                Admission::InFlight
            }
            // settle claims before it releases the in-flight entry, so a
            // completion that raced the first check is visible here.
            Entry::Vacant(_) if p.delivered.contains(id) => Admission::Delivered,
            Entry::Vacant(slot) => {
                let _ = slot.insert(Vec::new());
                Admission::Fresh
            }
        }
    }

    /// Claim `id` after a successful delivery and release its parked senders.
    pub fn settle(&self, kind: DeliveryKind, id: &IdempotencyId) -> Vec<Waiter> {
        let p = self.partition(kind);
        let _ = p.delivered.insert(id.clone());
        p.in_flight.remove(id).map(|(_, parked)| parked).unwrap_or_default()
    }

    /// Release an in-flight admission that will not complete.
    ///
    /// Parked senders are dropped unanswered; they retry at their own layer.
    /// Returns how many were dropped.
    pub fn abandon(&self, kind: DeliveryKind, id: &IdempotencyId) -> usize {
        self.partition(kind)
            .in_flight
            .remove(id)
            .map_or(0, |(_, parked)| parked.len())
    }

    /// Number of claimed ids of `kind`.
    pub fn claimed_count(&self, kind: DeliveryKind) -> usize {
        self.partition(kind).delivered.len()
    }
}
