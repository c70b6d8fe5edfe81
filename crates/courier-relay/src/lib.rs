//! # courier-relay
//!
//! Reliable relay of turn-based events between participants and the World.
//!
//! - [`ConnectionRegistry`]: participant ↔ live connection mapping
//! - [`DedupStore`]: completed `command_id` / `message_id` sets, and repeats parked on pending ones
//! - [`AckTracker`]: last inbound event per participant, with waitable acknowledgments
//! - [`DeliveryCoordinator`]: single-flight, retry-until-acknowledged delivery per participant
//! - [`SessionEndpoint`]: applies inbound frames to the above
//! - [`Relay`]: owns one of each, wired together

#![deny(unsafe_code)]

pub mod ack;
pub mod connection;
pub mod coordinator;
pub mod dedup;
pub mod endpoint;
pub mod errors;
pub mod metrics;
pub mod registry;
pub mod relay;

pub use ack::{AckTracker, Observed};
pub use connection::ClientConnection;
pub use coordinator::{DeliveryCoordinator, DeliveryPolicy, PendingDelivery};
pub use dedup::{Admission, DedupStore, Waiter};
pub use endpoint::SessionEndpoint;
pub use errors::DeliveryError;
pub use registry::ConnectionRegistry;
pub use relay::Relay;
