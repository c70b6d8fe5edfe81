//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file may name only the values it changes.

mod delivery;
mod server;

pub use delivery::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the Courier relay.
///
/// # JSON Format
///
/// ```json
/// {
///   "server": { "port": 3000 },
///   "delivery": { "ackPollIntervalMs": 250 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourierSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Network and socket settings.
    pub server: ServerSettings,
    /// Acknowledgment wait and retry policy.
    pub delivery: DeliverySettings,
    /// Task file locations served over HTTP.
    pub task: TaskSettings,
    /// Log level and format.
    pub logging: LoggingSettings,
}

impl Default for CourierSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "courier".to_string(),
            server: ServerSettings::default(),
            delivery: DeliverySettings::default(),
            task: TaskSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl CourierSettings {
    /// Reject combinations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_ACK_POLL_ATTEMPTS).contains(&self.delivery.ack_poll_attempts) {
            return Err(SettingsError::InvalidValue(format!(
                "delivery.ackPollAttempts must be between 1 and {MAX_ACK_POLL_ATTEMPTS}"
            )));
        }
        if !(1..=MAX_ACK_POLL_INTERVAL_MS).contains(&self.delivery.ack_poll_interval_ms) {
            return Err(SettingsError::InvalidValue(format!(
                "delivery.ackPollIntervalMs must be between 1 and {MAX_ACK_POLL_INTERVAL_MS}"
            )));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be at least 1".into(),
            ));
        }
        if self.server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalSecs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
