//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize logging and metrics
//! - Bind the listener and run the HTTP server until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listener binds last (traffic only when ready)

use std::net::SocketAddr;
use std::path::Path;

use tokio::net::TcpListener;

use crate::config::{load_config, ConfigError, FlowConfig};
use crate::http::{HttpServer, UpstreamError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::observability::{logging, metrics};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load the config at `path` and serve until a termination signal.
pub async fn serve_from_file(path: &Path) -> Result<(), StartupError> {
    let config = load_config(path)?;
    logging::init_logging(&config.observability);
    tracing::info!(config = %path.display(), "Configuration loaded");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());
    serve(config, shutdown).await
}

/// Serve an already validated configuration until `shutdown` fires.
pub async fn serve(config: FlowConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        batch_size = config.demand.batch_size,
        window_size = config.circuit_breaker.window_size,
        max_attempts = config.retries.max_attempts,
        request_timeout_ms = config.timeouts.request_ms,
        "Starting resilient-flow"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
