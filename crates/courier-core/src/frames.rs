//! JSON envelopes carried by each WebSocket text frame.
//!
//! ```json
//! {"event": "agent_send_message", "data": {...}, "ackId": 3}   // inbound
//! {"event": "new_message", "data": {...}}                       // push
//! {"event": "ack", "ackId": 3, "data": {...}}                   // completion
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::SOCKET_OPEN_GREETING;
use crate::errors::FrameError;
use crate::events::{EventName, InboundEvent};

/// Event name of completion frames.
pub const ACK_EVENT: &str = "ack";

/// Event name of rejection frames.
pub const ERROR_EVENT: &str = "error";

/// A frame received from a participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    /// Protocol event name.
    pub event: String,
    /// Event payload, forwarded verbatim.
    #[serde(default)]
    pub data: Value,
    /// Client-chosen id echoed back on the completion frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
}

impl InboundFrame {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Resolve the event name and validate the payload.
    pub fn event(&self) -> Result<InboundEvent, FrameError> {
        let name: EventName = self.event.parse()?;
        InboundEvent::parse(name, &self.data)
    }
}

/// A frame sent to a participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    /// Protocol event name, `ack`, or `error`.
    pub event: String,
    /// Set on `ack` and `error` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
    /// Payload (`null` for bare acknowledgments).
    #[serde(default)]
    pub data: Value,
}

impl OutboundFrame {
    /// A pushed protocol event.
    #[must_use]
    pub fn push(event: EventName, data: Value) -> Self {
        Self {
            event: event.as_str().to_owned(),
            ack_id: None,
            data,
        }
    }

    /// Completion of the inbound frame with `ack_id`.
    #[must_use]
    pub fn ack(ack_id: u64, data: Option<Value>) -> Self {
        Self {
            event: ACK_EVENT.to_owned(),
            ack_id: Some(ack_id),
            data: data.unwrap_or(Value::Null),
        }
    }

    /// Rejection of an inbound frame.
    #[must_use]
    pub fn error(ack_id: Option<u64>, err: &FrameError) -> Self {
        Self {
            event: ERROR_EVENT.to_owned(),
            ack_id,
            data: serde_json::json!({
                "code": err.code(),
                "message": err.to_string(),
            }),
        }
    }

    /// The greeting sent once per new connection.
    #[must_use]
    pub fn socket_open() -> Self {
        Self::push(
            EventName::SocketOpen,
            Value::String(SOCKET_OPEN_GREETING.to_owned()),
        )
    }

    /// Serialize to the wire representation.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
