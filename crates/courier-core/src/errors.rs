//! Errors raised while decoding inbound traffic.

use thiserror::Error;

/// An inbound frame that cannot be applied to relay state.
///
/// These are rejected before any registry or tracker is touched.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame is not a JSON object of the expected shape.
    #[error("invalid frame: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The `event` name is not part of the protocol.
    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    /// The event exists but only flows relay → participant.
    #[error("event '{0}' is not accepted from participants")]
    NotInbound(String),

    /// The payload is not a JSON object.
    #[error("payload of '{event}' must be an object")]
    PayloadNotObject {
        /// Event being decoded.
        event: &'static str,
    },

    /// A required payload field is absent, empty, or of the wrong type.
    #[error("'{event}' is missing required field '{field}'")]
    MissingField {
        /// Event being decoded.
        event: &'static str,
        /// Name of the missing field.
        field: &'static str,
    },
}

impl FrameError {
    /// Machine-readable error code for `error` frames.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "INVALID_JSON",
            Self::UnknownEvent(_) => "UNKNOWN_EVENT",
            Self::NotInbound(_) => "NOT_INBOUND",
            Self::PayloadNotObject { .. } | Self::MissingField { .. } => "INVALID_PAYLOAD",
        }
    }
}
