//! Time sources
//!
//! The coordinator never reads time itself; callers pass `now` in epoch
//! milliseconds. Sessions read it from a [`Clock`].

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of the current time in epoch milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Hand-driven clock for tests and `musicgate simulate`
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    /// Move forward by `millis`
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Wall-clock anchored at creation, advanced by tokio's monotonic clock.
///
/// Under `tokio::time::pause` it moves only when the runtime auto-advances,
/// which keeps session timing deterministic in tests.
#[derive(Debug, Clone)]
pub struct TokioClock {
    base_millis: i64,
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Anchor at the current wall-clock time
    pub fn anchored_now() -> Self {
        Self::anchored_at(Utc::now().timestamp_millis())
    }

    /// Anchor at an explicit epoch millisecond value
    pub fn anchored_at(base_millis: i64) -> Self {
        Self {
            base_millis,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        self.base_millis + self.origin.elapsed().as_millis() as i64
    }
}
