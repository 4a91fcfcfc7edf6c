//! Monotonic time source shared by the limiter and the access logger.
//!
//! # Design Decisions
//! - Only `Instant` is exposed; window arithmetic never depends on wall time
//! - `MockClock` lets tests step through windows deterministically

use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Port for obtaining the current monotonic instant.
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually driven clock for tests.
///
/// All clones share the same underlying instant, so advancing one clone
/// advances every limiter and logger holding another.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<Instant>>,
}

impl MockClock {
    /// Create a mock clock starting at `start`.
    pub fn new(start: Instant) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *now += duration;
    }

    /// Jump to a specific instant.
    pub fn set(&self, instant: Instant) {
        let mut now = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *now = instant;
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
