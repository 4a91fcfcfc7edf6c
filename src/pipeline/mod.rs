//! Request admission pipeline.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → 1. record arrival (monotonic clock + wall-clock timestamp)
//!     → 2. correlation id, attached as request extension
//!     → 3. rate-limit key from the configured extractor
//!     → 4. limiter check
//!          ├─ rejected → log {rejected, 429} → 429 + Retry-After
//!          └─ admitted → 5. delegate (panics caught)
//!                         → 6. log {admitted, status}
//!                         → 7. delegate response, or generic 500 on panic
//! ```
//!
//! Every path ends in exactly one access log entry. A request dropped by
//! the transport after stage 1 is logged as `cancelled` with status 499.
//!
//! # Design Decisions
//! - Stages are ordered calls over a request-scoped record inside one
//!   middleware function, so the order is visible in one place
//! - Installed with `from_fn_with_state` like any other axum middleware

mod admission;
mod middleware;

pub use admission::Admission;
pub use middleware::admission_middleware;
