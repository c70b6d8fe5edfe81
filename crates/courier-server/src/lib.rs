//! # courier-server
//!
//! Axum HTTP + `WebSocket` transport for the relay.
//!
//! - `WebSocket` gateway at `/ws`: one session per socket, ping/pong liveness
//! - `/health` and Prometheus `/metrics`
//! - Task endpoints: `/get_timestamp`, `/get_hit_config`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod task;
pub mod websocket;
