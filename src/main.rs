//! api-shield server.
//!
//! ```text
//!     Client Request
//!     ──▶ request id ──▶ trace ──▶ security headers ──▶ CORS ──▶ timeout
//!                                                                  │
//!                                      (POST/PUT/PATCH/DELETE only)▼
//!                                            rate limit ──▶ CSRF ──▶ application
//! ```
//!
//! Configuration comes from `--config <file>` when given, otherwise from
//! defaults plus environment variables.

use std::path::PathBuf;

use axum::{response::Json, routing::post, Router};
use clap::Parser;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use api_shield::config::{load_config, load_from_env, watcher::ConfigWatcher};
use api_shield::lifecycle::{initialize, signals::shutdown_on_signal, Shutdown};
use api_shield::observability::{logging::init_logging, metrics::init_metrics};
use api_shield::HttpServer;

#[derive(Parser)]
#[command(name = "api-shield")]
#[command(about = "Request-security layer for HTTP APIs", long_about = None)]
struct Args {
    /// Path to a TOML config file; hot-reloads the CORS allow-list on change
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    init_logging(&config.observability, config.environment)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-shield starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = %config.environment,
        rate_limit_mode = ?config.rate_limit.mode,
        request_timeout_secs = config.listener.request_timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let state = initialize(&config).await?;

    // Held for the lifetime of the process; dropping it stops reloads.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(w) => (Some(w), rx),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    (None, rx)
                }
            }
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_on_signal(&shutdown).await;
    });

    let app = Router::new().route("/api/echo", post(echo));
    let server = HttpServer::new(config, state, app);
    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Sample protected endpoint.
async fn echo(Json(body): Json<Value>) -> Json<Value> {
    Json(body)
}
