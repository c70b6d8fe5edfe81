//! Event vocabulary of the relay protocol.
//!
//! Participants announce liveness (`agent_alive`), ask the relay to forward
//! commands and messages (`agent_send_command` / `agent_send_message`), and
//! confirm deliveries with the matching `*_received` event. The relay pushes
//! `new_command` / `new_message` / `agent_alive` to the addressed participant.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::errors::FrameError;
use crate::ids::{IdempotencyId, ParticipantId};

/// Every event name that appears on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventName {
    /// Participant announces or renews liveness.
    AgentAlive,
    /// Participant asks for a command to be forwarded.
    AgentSendCommand,
    /// Participant asks for a message to be forwarded.
    AgentSendMessage,
    /// Relay delivers a forwarded command.
    NewCommand,
    /// Relay delivers a forwarded message.
    NewMessage,
    /// Recipient confirms a `new_command`.
    NewCommandReceived,
    /// Recipient confirms a `new_message`.
    NewMessageReceived,
    /// World confirms a forwarded `agent_alive`.
    AgentAliveReceived,
    /// Relay greets a freshly opened connection.
    SocketOpen,
}

impl EventName {
    /// All protocol events.
    pub const ALL: [Self; 9] = [
        Self::AgentAlive,
        Self::AgentSendCommand,
        Self::AgentSendMessage,
        Self::NewCommand,
        Self::NewMessage,
        Self::NewCommandReceived,
        Self::NewMessageReceived,
        Self::AgentAliveReceived,
        Self::SocketOpen,
    ];

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgentAlive => "agent_alive",
            Self::AgentSendCommand => "agent_send_command",
            Self::AgentSendMessage => "agent_send_message",
            Self::NewCommand => "new_command",
            Self::NewMessage => "new_message",
            Self::NewCommandReceived => "new_command_received",
            Self::NewMessageReceived => "new_message_received",
            Self::AgentAliveReceived => "agent_alive_received",
            Self::SocketOpen => "socket_open",
        }
    }

    /// The `*_received` event that acknowledges a push of `self`.
    ///
    /// `None` for events that are never pushed with an acknowledgment.
    #[must_use]
    pub fn received(self) -> Option<Self> {
        match self {
            Self::AgentAlive => Some(Self::AgentAliveReceived),
            Self::NewCommand => Some(Self::NewCommandReceived),
            Self::NewMessage => Some(Self::NewMessageReceived),
            _ => None,
        }
    }

    /// Whether this is one of the `*_received` acknowledgments.
    #[must_use]
    pub fn is_acknowledgment(self) -> bool {
        matches!(
            self,
            Self::NewCommandReceived | Self::NewMessageReceived | Self::AgentAliveReceived
        )
    }

    /// Whether participants may send this event to the relay.
    #[must_use]
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::AgentAlive | Self::AgentSendCommand | Self::AgentSendMessage
        ) || self.is_acknowledgment()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| FrameError::UnknownEvent(s.to_owned()))
    }
}

/// The two idempotent forwarding paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeliveryKind {
    /// `agent_send_command` → `new_command`.
    Command,
    /// `agent_send_message` → `new_message`.
    Message,
}

impl DeliveryKind {
    /// Event pushed to the receiver.
    #[must_use]
    pub fn forward_event(self) -> EventName {
        match self {
            Self::Command => EventName::NewCommand,
            Self::Message => EventName::NewMessage,
        }
    }

    /// Payload field carrying the idempotency id.
    #[must_use]
    pub fn id_field(self) -> &'static str {
        match self {
            Self::Command => "command_id",
            Self::Message => "message_id",
        }
    }

    /// Lowercase label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Message => "message",
        }
    }
}

/// A validated inbound event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    /// `agent_alive`.
    Alive {
        /// Announcing participant.
        by: ParticipantId,
    },
    /// `agent_send_command` or `agent_send_message`.
    Send {
        /// Which forwarding path.
        kind: DeliveryKind,
        /// Addressed participant.
        receiver: ParticipantId,
        /// Caller-supplied duplicate-suppression key.
        idempotency_id: IdempotencyId,
    },
    /// One of the `*_received` acknowledgments.
    Received {
        /// Which acknowledgment.
        event: EventName,
        /// Acknowledging participant.
        by: ParticipantId,
    },
}

impl InboundEvent {
    /// Validate `data` as the payload of `event`.
    pub fn parse(event: EventName, data: &Value) -> Result<Self, FrameError> {
        let name = event.as_str();
        if !event.is_inbound() {
            return Err(FrameError::NotInbound(name.to_owned()));
        }
        if !data.is_object() {
            return Err(FrameError::PayloadNotObject { event: name });
        }

        match event {
            EventName::AgentAlive => Ok(Self::Alive {
                by: required(name, data, "by_worker_id")?.into(),
            }),
            EventName::AgentSendCommand | EventName::AgentSendMessage => {
                let kind = if event == EventName::AgentSendCommand {
                    DeliveryKind::Command
                } else {
                    DeliveryKind::Message
                };
                Ok(Self::Send {
                    kind,
                    receiver: required(name, data, "receiver_worker_id")?.into(),
                    idempotency_id: required(name, data, kind.id_field())?.into(),
                })
            }
            _ => Ok(Self::Received {
                event,
                by: required(name, data, "by_worker_id")?.into(),
            }),
        }
    }

    /// Wire name of this event.
    #[must_use]
    pub fn name(&self) -> EventName {
        match self {
            Self::Alive { .. } => EventName::AgentAlive,
            Self::Send {
                kind: DeliveryKind::Command,
                ..
            } => EventName::AgentSendCommand,
            Self::Send {
                kind: DeliveryKind::Message,
                ..
            } => EventName::AgentSendMessage,
            Self::Received { event, .. } => *event,
        }
    }
}

/// Extract a non-empty string (or integer, normalized) field.
fn required(event: &'static str, data: &Value, field: &'static str) -> Result<String, FrameError> {
    match data.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        _ => Err(FrameError::MissingField { event, field }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
