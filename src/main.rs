//! Admission gate server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ axum::serve ──▶ admission_middleware ───────▶ TimeoutLayer ──▶ handlers
//!                                      │ correlation id                                    (/health, /)
//!                                      │ rate-limit key
//!                                      │ FixedWindowLimiter (DashMap)
//!                                      │
//!                                      └──▶ AccessLogger ──▶ bounded queue ──▶ drain task ──▶ sink
//!
//!     Diagnostics: tracing subscriber on stderr        Metrics: Prometheus exporter (optional)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use admission_gate::config::{load_config, GateConfig};
use admission_gate::lifecycle::{shutdown_signal, stop_in_order, Shutdown};
use admission_gate::observability::{access_log::AccessLogger, logging, metrics};
use admission_gate::HttpServer;

#[derive(Parser)]
#[command(name = "admission-gate")]
#[command(about = "Rate-limited, access-logged HTTP front door", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GateConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "admission-gate starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        rate_limit_enabled = config.rate_limit.enabled,
        quota = %config.rate_limit.quota,
        log_format = ?config.logging.format,
        "Configuration loaded"
    );

    if config.metrics.enabled {
        match config.metrics.address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.metrics.address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The access log outlives the server so in-flight requests still get logged.
    let log_shutdown = Shutdown::new();
    let (logger, log_drain) = AccessLogger::from_config(&config.logging, log_shutdown.subscribe())?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, logger);
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, server_shutdown));

    stop_in_order(shutdown_signal(), &shutdown, server_task, &log_shutdown, log_drain).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
