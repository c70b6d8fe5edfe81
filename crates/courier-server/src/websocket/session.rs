//! WebSocket session lifecycle: one connected participant from upgrade
//! through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use courier_core::frames::OutboundFrame;
use courier_core::ids::ConnectionId;
use courier_relay::{ClientConnection, Relay};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::handler::{Incoming, classify, handle_message};
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// Per-socket tunables.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// Outbound frames buffered before pushes are dropped.
    pub send_queue_capacity: usize,
    /// Interval between server Pings.
    pub ping_interval: Duration,
    /// Silence after which the client is disconnected.
    pub pong_timeout: Duration,
}

/// Run a WebSocket session for a connected client.
///
/// 1. Sends `socket_open` before anything else
/// 2. Applies incoming frames through the relay's session endpoint
/// 3. Forwards pushes, acks and errors via the connection's send channel
/// 4. Pings periodically and disconnects unresponsive clients
/// 5. Unbinds the connection on disconnect
#[instrument(skip_all, fields(connection_id = %connection_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection_id: ConnectionId,
    relay: Relay,
    config: SessionConfig,
    cancel: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(connection_id, send_tx));

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    match OutboundFrame::socket_open().encode() {
        Ok(json) => {
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                debug!("socket closed before greeting");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode greeting"),
    }

    let outbound_conn = connection.clone();
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(config.ping_interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text(frame.as_str().to_owned().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_seen_elapsed() > config.pong_timeout
                    {
                        warn!(timeout = ?config.pong_timeout, "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let endpoint = relay.endpoint();
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                connection.mark_alive();
                match classify(msg) {
                    Incoming::Text(text) => handle_message(endpoint, &connection, &text),
                    Incoming::Close => {
                        info!("client sent close frame");
                        break;
                    }
                    Incoming::Liveness | Incoming::Ignored => {}
                }
            }
            _ = &mut outbound => {
                debug!("outbound task ended");
                break;
            }
        }
    }

    endpoint.connection_closed(&connection.id);
    outbound.abort();
    info!(
        dropped_frames = connection.drop_count(),
        age_secs = connection.age().as_secs(),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
}
