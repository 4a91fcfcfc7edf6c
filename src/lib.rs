//! Request admission gate.
//!
//! Correlation ids, per-client fixed-window rate limiting and structured
//! access logging in front of any axum router.

pub mod clock;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod security;

pub use config::schema::GateConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::{admission_middleware, Admission};
