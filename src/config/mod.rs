//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → quota.rs ("100/minute" → Quota, rejects zero limit/period)
//!     → validation.rs (semantic checks)
//!     → GateConfig (validated, immutable)
//!     → handed to the limiter, access logger and server at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a bad config is fatal at startup
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod quota;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use quota::{Quota, QuotaError};
pub use schema::{
    GateConfig, KeyStrategy, ListenerConfig, LogFormat, LogOutput, LoggingConfig, MetricsConfig,
    RateLimitConfig, TimeoutConfig,
};
