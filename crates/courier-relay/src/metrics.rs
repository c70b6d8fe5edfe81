//! Metric names recorded by the relay core.

/// Deliveries queued (counter, labels: event).
pub const RELAY_DELIVERIES_TOTAL: &str = "relay_deliveries_total";
/// Pushes repeated after an acknowledgment timeout (counter, labels: event).
pub const RELAY_DELIVERY_RETRIES_TOTAL: &str = "relay_delivery_retries_total";
/// Deliveries that observed their acknowledgment (counter, labels: event).
pub const RELAY_DELIVERIES_ACKNOWLEDGED_TOTAL: &str = "relay_deliveries_acknowledged_total";
/// Deliveries dropped because the target was not connected (counter).
pub const RELAY_DELIVERIES_UNRESOLVED_TOTAL: &str = "relay_deliveries_unresolved_total";
/// Sends acknowledged from the dedup store without forwarding (counter, labels: kind).
pub const RELAY_DEDUP_HITS_TOTAL: &str = "relay_dedup_hits_total";
/// Inbound frames rejected as malformed (counter, labels: code).
pub const RELAY_FRAMES_REJECTED_TOTAL: &str = "relay_frames_rejected_total";
/// Deliveries queued or awaiting acknowledgment (gauge).
pub const RELAY_DELIVERIES_IN_FLIGHT: &str = "relay_deliveries_in_flight";
