//! Diagnostic logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber used as the diagnostic channel
//! - Pick JSON or human-readable output to match the access log format
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level when set
//! - Access log entries never go through this channel; they have their own sink

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("admission_gate={},tower_http=info", config.level))
    })
}

/// Install the global diagnostic subscriber.
///
/// Returns an error if a global subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    match config.format {
        LogFormat::Structured => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    }
}
