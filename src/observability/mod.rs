//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Admission pipeline produces:
//!     → access_log.rs (one entry per request → bounded queue → drain task → sink)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Every subsystem produces:
//!     → logging.rs (diagnostic tracing events on stderr)
//! ```
//!
//! # Design Decisions
//! - Access log and diagnostics are separate channels; a failing access
//!   log sink is reported through diagnostics
//! - Correlation id flows into every access log entry
//! - Metrics are cheap (atomic increments)

pub mod access_log;
pub mod logging;
pub mod metrics;

pub use access_log::{AccessDecision, AccessLogEntry, AccessLogger, LogSink, MemorySink};
