//! One fully wired relay instance.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::ack::AckTracker;
use crate::coordinator::{DeliveryCoordinator, DeliveryPolicy};
use crate::dedup::DedupStore;
use crate::endpoint::SessionEndpoint;
use crate::registry::ConnectionRegistry;

/// Registry, dedup store, tracker, coordinator and endpoint sharing state.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
    dedup: Arc<DedupStore>,
    acks: Arc<AckTracker>,
    coordinator: Arc<DeliveryCoordinator>,
    endpoint: Arc<SessionEndpoint>,
}

impl Relay {
    /// Build a relay whose pending deliveries stop when `cancel` fires.
    pub fn new(policy: DeliveryPolicy, cancel: CancellationToken) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dedup = Arc::new(DedupStore::new());
        let acks = Arc::new(AckTracker::new());
        let coordinator = Arc::new(DeliveryCoordinator::new(
            registry.clone(),
            acks.clone(),
            policy,
            cancel,
        ));
        let endpoint = Arc::new(SessionEndpoint::new(
            registry.clone(),
            dedup.clone(),
            acks.clone(),
            coordinator.clone(),
        ));
        Self {
            registry,
            dedup,
            acks,
            coordinator,
            endpoint,
        }
    }

    /// Inbound frame handlers.
    pub fn endpoint(&self) -> &Arc<SessionEndpoint> {
        &self.endpoint
    }

    /// Participant bindings.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Completed idempotency ids.
    pub fn dedup(&self) -> &Arc<DedupStore> {
        &self.dedup
    }

    /// Last inbound event per participant.
    pub fn acks(&self) -> &Arc<AckTracker> {
        &self.acks
    }

    /// Delivery lanes.
    pub fn coordinator(&self) -> &Arc<DeliveryCoordinator> {
        &self.coordinator
    }
}
