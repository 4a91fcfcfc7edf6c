//! Per-request correlation identity.
//!
//! # Responsibilities
//! - Generate a unique correlation id for every inbound request
//! - Carry the id, method, path and rate-limit key as a request extension
//!   so delegate handlers can log against the same id
//!
//! # Design Decisions
//! - Always a fresh UUID v4; incoming `X-Request-ID` values are not trusted
//! - Generated as early as possible, before the limiter runs

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Response header carrying the correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Opaque per-request identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Generate a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request-scoped context attached to the request extensions.
///
/// Handlers can read it with `Extension<RequestContext>`.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: CorrelationId,
    pub method: String,
    pub path: String,
    pub client_key: String,
}
