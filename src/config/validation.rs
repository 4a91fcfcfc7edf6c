//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, queue capacity > 0)
//! - Check addresses, paths and header names are well formed
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;

use crate::config::schema::{GateConfig, KeyStrategy};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: `{value}` is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
    #[error("rate_limit.exempt_paths: `{0}` must start with '/'")]
    InvalidExemptPath(String),
    #[error("rate_limit.key: `{0}` is not a valid header name")]
    InvalidHeaderName(String),
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::MustBePositive("timeouts.request_secs"));
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.retention_multiple == 0 {
        errors.push(ValidationError::MustBePositive("rate_limit.retention_multiple"));
    }
    if rate_limit.purge_interval_secs == 0 {
        errors.push(ValidationError::MustBePositive("rate_limit.purge_interval_secs"));
    }
    for path in &rate_limit.exempt_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::InvalidExemptPath(path.clone()));
        }
    }
    if let KeyStrategy::Header(name) = &rate_limit.key {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            errors.push(ValidationError::InvalidHeaderName(name.clone()));
        }
    }

    if config.logging.queue_capacity == 0 {
        errors.push(ValidationError::MustBePositive("logging.queue_capacity"));
    }
    if config.logging.flush_interval_ms == 0 {
        errors.push(ValidationError::MustBePositive("logging.flush_interval_ms"));
    }

    if config.metrics.enabled && config.metrics.address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "metrics.address",
            value: config.metrics.address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
