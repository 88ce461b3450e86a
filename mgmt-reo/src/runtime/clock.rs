//! Engine time source.
//!
//! The engine measures entry age and quiescence in microseconds of its own
//! monotonic clock, independent of the 32-bit global timestamps carried by
//! frames. Tests and the simulator drive a [`ManualClock`] instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use minstant::Instant;

/// Monotonic microsecond clock.
pub trait Clock: Send + Sync {
    /// Microseconds since an arbitrary fixed origin.
    fn now_us(&self) -> u64;
}

/// Wall-independent clock backed by the TSC where available.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_us(&self) -> u64 {
        u64::try_from(self.anchor.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward.
    pub fn advance(&self, by: Duration) {
        let us = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        self.now_us.fetch_add(us, Ordering::AcqRel);
    }

    /// Sets the absolute time. Must not move backwards.
    pub fn set_us(&self, now_us: u64) {
        let prev = self.now_us.swap(now_us, Ordering::AcqRel);
        debug_assert!(prev <= now_us, "manual clock moved backwards: {prev} -> {now_us}");
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::Acquire)
    }
}
