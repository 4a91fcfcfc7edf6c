//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gate.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::config::quota::Quota;

/// Root configuration for the admission gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Access log and diagnostic logging settings.
    pub logging: LoggingConfig,

    /// Metrics exporter settings.
    pub metrics: MetricsConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for the delegate handler in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// How the rate-limit key is derived from a request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Client network address.
    #[default]
    ClientIp,
    /// Client network address combined with the request path.
    ClientIpAndPath,
    /// Value of a request header, falling back to the client address.
    Header(String),
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting. When disabled every request is admitted.
    pub enabled: bool,

    /// Requests allowed per window, e.g. "100/minute".
    pub quota: Quota,

    /// Key derivation strategy.
    pub key: KeyStrategy,

    /// Paths that bypass the limiter (still logged).
    pub exempt_paths: Vec<String>,

    /// Idle windows older than this many periods are purged.
    pub retention_multiple: u32,

    /// Interval between purge sweeps in seconds.
    pub purge_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quota: Quota::default(),
            key: KeyStrategy::default(),
            exempt_paths: Vec::new(),
            retention_multiple: 10,
            purge_interval_secs: 60,
        }
    }
}

/// Access log encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    #[serde(alias = "json")]
    Structured,
    /// Human-readable single line.
    Text,
}

/// Destination of access log lines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File(String),
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Diagnostic log level (trace, debug, info, warn, error).
    pub level: String,

    /// Encoding used for access log entries and diagnostic output.
    pub format: LogFormat,

    /// Where access log entries are written.
    pub output: LogOutput,

    /// Capacity of the access log queue; entries beyond it are dropped.
    pub queue_capacity: usize,

    /// Sink flush interval in milliseconds.
    pub flush_interval_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            queue_capacity: 8192,
            flush_interval_ms: 1000,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus endpoint.
    pub enabled: bool,

    /// Metrics endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:9090".to_string(),
        }
    }
}
