//! Wall-clock injection.
//!
//! Operations stamp atime/mtime/ctime through a `Clock` so tests can
//! drive time deterministically instead of sampling the host.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of timestamp seconds.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u32;
}

/// Host wall clock, truncated to u32 seconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u32 {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        u32::try_from(since_epoch.as_secs()).unwrap_or(u32::MAX)
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: AtomicU32,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: u32) -> Self {
        Self {
            secs: AtomicU32::new(start),
        }
    }

    pub fn set(&self, secs: u32) {
        self.secs.store(secs, Ordering::Relaxed);
    }

    pub fn advance(&self, delta: u32) {
        self.secs.fetch_add(delta, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u32 {
        self.secs.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_is_settable() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_secs(), 100);
        clock.advance(5);
        assert_eq!(clock.now_secs(), 105);
        clock.set(42);
        assert_eq!(clock.now_secs(), 42);
    }

    #[test]
    fn system_clock_is_past_2020() {
        assert!(SystemClock.now_secs() > 1_577_836_800);
    }
}
