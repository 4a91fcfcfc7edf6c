//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → key.rs (derive the rate-limit key: client IP, IP + path, header)
//!     → rate_limit.rs (fixed-window check under the key's shard lock)
//!     → Decision handed back to the admission pipeline
//! ```
//!
//! # Design Decisions
//! - All limiter state is process-local
//! - Per-key exclusive access, no global lock across keys
//! - The limiter never errors; misconfiguration is caught at startup

pub mod key;
pub mod rate_limit;

pub use key::{ClientIpAndPathKey, ClientIpKey, HeaderKey, KeyExtractor, SharedKeyExtractor};
pub use rate_limit::{Decision, FixedWindowLimiter, RateLimitKey};
