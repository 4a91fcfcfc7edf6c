//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → shutdown.rs trigger
//!
//! Shutdown (shutdown.rs):
//!     stop_in_order → server stops accepting, drains in-flight requests
//!                   → purge task exits
//!                   → access log drain task writes out its queue
//!                     (also when the server failed)
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain requests, then flush the access log

pub mod shutdown;
pub mod signals;

pub use shutdown::{stop_in_order, Shutdown, ShutdownError};
pub use signals::shutdown_signal;
