//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (axum::serve, connect info)
//!     → server.rs (router, timeout, admission middleware)
//!     → request.rs (correlation id + request context)
//!     → [admission pipeline decides]
//!     → response.rs (429 / 500 bodies, X-Request-ID and quota headers)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{CorrelationId, RequestContext, X_REQUEST_ID};
pub use server::HttpServer;
