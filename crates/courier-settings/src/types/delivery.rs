//! Delivery policy and task file settings.

use serde::{Deserialize, Serialize};

/// Upper bound for `ackPollAttempts`.
pub const MAX_ACK_POLL_ATTEMPTS: u32 = 1000;

/// Upper bound for `ackPollIntervalMs` (ten minutes).
pub const MAX_ACK_POLL_INTERVAL_MS: u64 = 600_000;

/// Acknowledgment wait and retry policy.
///
/// The relay waits `ackPollAttempts × ackPollIntervalMs` for a `*_received`
/// event before resending.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverySettings {
    /// Acknowledgment polling windows per attempt.
    pub ack_poll_attempts: u32,
    /// Length of one polling window in milliseconds.
    pub ack_poll_interval_ms: u64,
    /// Give up after this many attempts; `0` retries until acknowledged.
    pub max_delivery_attempts: u32,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            ack_poll_attempts: 2,
            ack_poll_interval_ms: 500,
            max_delivery_attempts: 0,
        }
    }
}

/// Task directory served to the task pages.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskSettings {
    /// Directory holding the task's static files.
    pub task_dir: String,
    /// HIT configuration file name inside `task_dir`.
    pub hit_config_file: String,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            task_dir: "task".to_string(),
            hit_config_file: "hit_config.json".to_string(),
        }
    }
}
