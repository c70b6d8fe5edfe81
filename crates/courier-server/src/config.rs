//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use courier_relay::DeliveryPolicy;
use courier_settings::{CourierSettings, DeliverySettings};

/// Configuration for the Courier server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server Pings.
    pub heartbeat_interval: Duration,
    /// Silence after which a client is disconnected.
    pub heartbeat_timeout: Duration,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per socket before pushes are dropped.
    pub send_queue_capacity: usize,
    /// Acknowledgment timing.
    pub delivery: DeliveryPolicy,
    /// Directory holding task files.
    pub task_dir: PathBuf,
    /// HIT configuration file name inside `task_dir`.
    pub hit_config_file: String,
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &CourierSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            heartbeat_interval: Duration::from_secs(server.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(server.heartbeat_timeout_secs),
            max_message_size: server.max_message_size,
            send_queue_capacity: server.send_queue_capacity,
            delivery: delivery_policy(&settings.delivery),
            task_dir: PathBuf::from(&settings.task.task_dir),
            hit_config_file: settings.task.hit_config_file.clone(),
        }
    }

    /// Path of the HIT configuration file.
    pub fn hit_config_path(&self) -> PathBuf {
        self.task_dir.join(&self.hit_config_file)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            heartbeat_interval: Duration::from_secs(25),
            heartbeat_timeout: Duration::from_secs(60),
            max_message_size: 1024 * 1024,
            send_queue_capacity: 256,
            delivery: DeliveryPolicy::default(),
            task_dir: PathBuf::from("task"),
            hit_config_file: "hit_config.json".into(),
        }
    }
}

/// Delivery policy for the given settings. A ceiling of `0` means unbounded.
pub fn delivery_policy(settings: &DeliverySettings) -> DeliveryPolicy {
    DeliveryPolicy {
        ack_poll_attempts: settings.ack_poll_attempts,
        ack_poll_interval: Duration::from_millis(settings.ack_poll_interval_ms),
        max_attempts: (settings.max_delivery_attempts > 0).then_some(settings.max_delivery_attempts),
    }
}
