//! HTTP API and dashboard for the relay controller.
//!
//! The routes mirror the classic relay-board API (`/on/3`, `/status/3`, ...)
//! plus a couple of JSON endpoints for the dashboard. Controller calls block
//! (bulk delays, reboot off-time), so handlers run them on the blocking pool.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod router;

pub use config::WebConfig;
pub use router::create_app;

use crate::config::{AuthConfig, RelayConfig};
use crate::error::{RelayError, Result};
use crate::relay::RelayController;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RelayController>,
    /// Dashboard title
    pub name: Arc<str>,
    pub reboot_delay: Duration,
    pub auth: Option<Arc<AuthConfig>>,
    /// Custom dashboard page, when one exists on disk
    pub index_file: Option<PathBuf>,
}

impl AppState {
    pub fn new(controller: Arc<RelayController>, config: &RelayConfig) -> Self {
        Self {
            controller,
            name: Arc::from(config.name.as_str()),
            reboot_delay: Duration::from_millis(config.reboot_delay_ms),
            auth: config.auth.clone().map(Arc::new),
            index_file: None,
        }
    }
}

/// Serve the API until Ctrl-C or SIGTERM, then release the GPIO lines.
pub async fn start_web_server(config: RelayConfig, controller: Arc<RelayController>) -> Result<()> {
    let web = config.web.clone();
    let state = AppState::new(controller.clone(), &config);
    if state.auth.is_none() {
        warn!("HTTP authentication is disabled");
    }
    let app = create_app(&web, state);

    let addr = web
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| RelayError::config_error(format!("Invalid bind address: {}", e)))?;

    info!("Starting {} on http://{}", config.name, addr);
    info!("Dashboard available at http://{}/", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RelayError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| RelayError::web_server_error(format!("Server error: {}", e)));

    info!("Shutting down, releasing GPIO lines");
    tokio::task::spawn_blocking(move || controller.release())
        .await
        .map_err(|e| RelayError::web_server_error(format!("Release task failed: {}", e)))?;

    served
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
