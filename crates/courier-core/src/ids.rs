//! Branded ID newtypes.
//!
//! Participants, connections and idempotency keys are all strings on the
//! wire. Wrapping each in its own type keeps a worker id from being passed
//! where a command id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::constants::WORLD_ID;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Stable identity of a participant: a worker session or the World.
    ParticipantId
}

branded_id! {
    /// Identity of one live transport connection.
    ConnectionId
}

branded_id! {
    /// Caller-supplied `command_id` / `message_id` used to suppress duplicates.
    IdempotencyId
}

impl ParticipantId {
    /// The reserved World identity.
    #[must_use]
    pub fn world() -> Self {
        Self(WORLD_ID.to_owned())
    }

    /// Whether this is the World sentinel.
    #[must_use]
    pub fn is_world(&self) -> bool {
        self.0 == WORLD_ID
    }
}

impl ConnectionId {
    /// Allocate a fresh connection id (`conn_` + UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_sentinel() {
        let world = ParticipantId::world();
        assert_eq!(world.as_str(), "[World]");
        assert!(world.is_world());
        assert!(!ParticipantId::from("w1").is_world());
    }

    #[test]
    fn world_check_is_exact() {
        assert!(!ParticipantId::from("[world]").is_world());
        assert!(!ParticipantId::from(" [World]").is_world());
    }

    #[test]
    fn connection_ids_are_unique_and_prefixed() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert!(a.starts_with("conn_"));
    }

    #[test]
    fn deref_and_display() {
        let id = IdempotencyId::from("c1");
        let s: &str = &id;
        assert_eq!(s, "c1");
        assert_eq!(format!("{id}"), "c1");
    }

    #[test]
    fn serde_is_transparent() {
        let id = ParticipantId::from("w7");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"w7\"");
        let back: ParticipantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn hash_and_eq() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        let _ = set.insert(IdempotencyId::from("same"));
        let _ = set.insert(IdempotencyId::from("same"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn into_inner() {
        let id = ParticipantId::from("inner");
        assert_eq!(id.into_inner(), "inner");
    }
}
