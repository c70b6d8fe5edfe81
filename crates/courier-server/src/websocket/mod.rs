//! WebSocket session lifecycle and frame dispatch.

pub mod handler;
pub mod session;
