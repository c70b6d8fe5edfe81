//! # courier
//!
//! Courier relay binary: loads settings, starts the HTTP/WebSocket server and
//! runs until Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use courier_core::constants::VERSION;
use courier_core::logging::init_subscriber;
use courier_server::config::ServerConfig;
use courier_server::server::CourierServer;
use courier_settings::{CourierSettings, load_settings_from_path, settings_path};
use tracing::{info, warn};

/// Turn-based event relay between task workers and the World.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about = "Turn-based event relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.courier/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `courier_relay=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Load settings and apply command-line overrides.
    fn resolve_settings(&self) -> Result<CourierSettings> {
        let path = self.settings.clone().unwrap_or_else(settings_path);
        let mut settings = load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;
    init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics = match courier_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            None
        }
    };

    let server = CourierServer::new(ServerConfig::from_settings(&settings), metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!(
        %addr,
        version = VERSION,
        max_connections = server.config().max_connections,
        "courier listening on http://{addr}"
    );

    shutdown_signal().await?;
    info!(open_sockets = server.live_sockets(), "Shutting down...");
    server.shutdown().graceful_shutdown(vec![handle], None).await;
    info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}
