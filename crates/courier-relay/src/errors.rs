//! Delivery failures.

use courier_core::events::EventName;
use thiserror::Error;

/// Why a delivery resolved without an acknowledgment.
///
/// An absent target is not an error: [`deliver`](crate::DeliveryCoordinator::deliver)
/// returns `None` and nothing is queued.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The configured attempt ceiling was reached.
    #[error("no acknowledgment after {attempts} attempts")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },

    /// The relay is shutting down.
    #[error("delivery cancelled by shutdown")]
    Cancelled,

    /// The participant's lane stopped before resolving this delivery.
    #[error("delivery lane closed")]
    LaneClosed,

    /// The event has no `*_received` counterpart to wait for.
    #[error("event '{0}' cannot be acknowledged")]
    NotAckable(EventName),

    /// The payload could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}
