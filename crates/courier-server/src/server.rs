//! `CourierServer`: Axum HTTP + WebSocket server around one [`Relay`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use courier_core::ids::ConnectionId;
use courier_relay::Relay;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::{self as server_metrics, WS_CONNECTIONS_REJECTED_TOTAL};
use crate::shutdown::ShutdownCoordinator;
use crate::task;
use crate::websocket::session::{SessionConfig, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay core.
    pub relay: Relay,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Open WebSocket connections.
    pub live_sockets: Arc<AtomicUsize>,
    /// Prometheus handle for `/metrics`.
    pub metrics: Option<PrometheusHandle>,
}

/// The Courier server.
pub struct CourierServer {
    state: AppState,
}

impl CourierServer {
    /// Create a server. Pending deliveries stop when the server shuts down.
    pub fn new(config: ServerConfig, metrics: Option<PrometheusHandle>) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let relay = Relay::new(config.delivery, shutdown.child_token());
        Self {
            state: AppState {
                relay,
                config: Arc::new(config),
                shutdown,
                start_time: Instant::now(),
                live_sockets: Arc::new(AtomicUsize::new(0)),
                metrics,
            },
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/get_timestamp", get(task::get_timestamp))
            .route("/get_hit_config", get(task::get_hit_config))
            .with_state(self.state.clone())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve in the background until shutdown.
    ///
    /// Returns the bound address and the serve task handle.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let config = &self.state.config;
        let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "courier server listening");

        let router = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
            {
                warn!(error = %e, "server stopped with error");
            }
        });
        Ok((addr, handle))
    }

    /// Relay core.
    pub fn relay(&self) -> &Relay {
        &self.state.relay
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Open WebSocket connections.
    pub fn live_sockets(&self) -> usize {
        self.state.live_sockets.load(Ordering::Relaxed)
    }
}

/// Holds one slot of the connection limit.
struct SocketSlot(Arc<AtomicUsize>);

impl SocketSlot {
    fn acquire(live: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        let slot = Self(live.clone());
        // The slot is released on drop, including when admission fails.
        (live.fetch_add(1, Ordering::AcqRel) < max).then_some(slot)
    }
}

impl Drop for SocketSlot {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(slot) = SocketSlot::acquire(&state.live_sockets, state.config.max_connections) else {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(
            max = state.config.max_connections,
            "connection limit reached, rejecting upgrade"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };

    let session = SessionConfig {
        send_queue_capacity: state.config.send_queue_capacity,
        ping_interval: state.config.heartbeat_interval,
        pong_timeout: state.config.heartbeat_timeout,
    };
    let relay = state.relay.clone();
    let cancel = state.shutdown.token();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            run_ws_session(socket, ConnectionId::new(), relay, session, cancel).await;
        })
        .into_response()
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.live_sockets.load(Ordering::Relaxed),
        state.relay.registry().len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    server_metrics::render(state.metrics.as_ref())
}
