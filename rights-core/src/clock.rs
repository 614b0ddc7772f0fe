//! Clock abstraction for testable time
//!
//! License expiry is relative to "now", so every time-dependent decision in
//! the registry reads a [`Clock`] instead of the system time directly.

use crate::types::UnixSeconds;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of the current time in unix seconds
pub trait Clock: Send + Sync {
    /// Current time in seconds since Unix epoch
    fn now(&self) -> UnixSeconds;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UnixSeconds {
        Utc::now().timestamp().max(0) as UnixSeconds
    }
}

/// Manually advanced clock for tests and simulations
///
/// Clones share the same underlying time, so a test can keep one handle and
/// hand another to the registry.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Start at `now`
    pub fn new(now: UnixSeconds) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(now)),
        }
    }

    /// Move time forward
    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    /// Jump to an absolute time
    pub fn set(&self, now: UnixSeconds) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UnixSeconds {
        self.now.load(Ordering::SeqCst)
    }
}
