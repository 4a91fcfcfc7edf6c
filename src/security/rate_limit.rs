//! Fixed-window rate limiter keyed by client identity.
//!
//! Each key owns a `(window_start, count)` pair inside a `DashMap`. The
//! read-modify-write for a key happens while holding that key's shard write
//! lock, so two concurrent requests for the same key can never both observe
//! `count < limit` and both be admitted. Keys in different shards never
//! contend.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::Quota;
use crate::observability::metrics;

/// Identity under which quota is tracked (client address, address + route...).
pub type RateLimitKey = String;

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request counts against the window; `remaining` slots are left.
    Admitted { remaining: u64 },
    /// The window is saturated until `retry_after` has elapsed.
    Rejected { retry_after: Duration },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted { .. })
    }
}

/// Per-key window state.
#[derive(Debug, Clone, Copy)]
struct WindowState {
    window_start: Instant,
    count: u64,
}

impl WindowState {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    fn try_acquire(&mut self, now: Instant, quota: &Quota) -> Decision {
        let elapsed = now.saturating_duration_since(self.window_start);

        // Arrival exactly on the boundary belongs to the new window.
        if elapsed >= quota.period() {
            self.window_start = now;
            self.count = 0;
        }

        if self.count >= quota.limit() {
            let elapsed = now.saturating_duration_since(self.window_start);
            Decision::Rejected {
                retry_after: quota.period().saturating_sub(elapsed),
            }
        } else {
            self.count += 1;
            Decision::Admitted {
                remaining: quota.limit() - self.count,
            }
        }
    }
}

/// Fixed-window counter limiter.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    windows: DashMap<RateLimitKey, WindowState>,
    quota: Quota,
    retention: Duration,
}

impl FixedWindowLimiter {
    /// Create a limiter; idle windows are kept for ten periods.
    pub fn new(quota: Quota) -> Self {
        Self::with_retention(quota, 10)
    }

    /// Create a limiter purging windows idle for `retention_multiple` periods.
    pub fn with_retention(quota: Quota, retention_multiple: u32) -> Self {
        Self {
            windows: DashMap::new(),
            quota,
            retention: quota.period().saturating_mul(retention_multiple.max(1)),
        }
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Admit or reject one request for `key` at `now`.
    pub fn check(&self, key: &str, now: Instant) -> Decision {
        if let Some(mut window) = self.windows.get_mut(key) {
            return window.try_acquire(now, &self.quota);
        }

        // First sighting: the entry API re-checks under the shard lock in
        // case another request inserted the key in between.
        self.windows
            .entry(key.to_owned())
            .or_insert_with(|| WindowState::new(now))
            .try_acquire(now, &self.quota)
    }

    /// Drop windows that started more than the retention span ago.
    ///
    /// Returns the number of keys removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, window| now.saturating_duration_since(window.window_start) < self.retention);
        let removed = before.saturating_sub(self.windows.len());

        metrics::record_tracked_keys(self.windows.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.windows.len(), "Purged idle rate-limit windows");
        }
        removed
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}
