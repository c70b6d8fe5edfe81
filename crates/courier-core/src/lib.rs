//! # courier-core
//!
//! Foundation types for the Courier relay.
//!
//! This crate provides the shared vocabulary that all other Courier crates depend on:
//!
//! - **Branded IDs**: `ParticipantId`, `ConnectionId`, `IdempotencyId` as newtypes
//! - **Events**: the `EventName` vocabulary and typed `InboundEvent` parsing
//! - **Frames**: `InboundFrame` / `OutboundFrame`, the JSON envelope on the socket
//! - **Errors**: `FrameError` for malformed inbound traffic
//! - **Logging**: `tracing` subscriber installation

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod events;
pub mod frames;
pub mod ids;
pub mod logging;

pub use errors::FrameError;
pub use events::{DeliveryKind, EventName, InboundEvent};
pub use frames::{InboundFrame, OutboundFrame};
pub use ids::{ConnectionId, IdempotencyId, ParticipantId};
