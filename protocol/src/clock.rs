//! # Ledger Time
//!
//! Every time-gated rule in the vault (unlock checks, reward accrual) reads
//! `now` through the [`Clock`] trait instead of the wall clock. Production
//! nodes use [`SystemClock`]; tests, journal replay and dev-mode nodes use
//! [`ManualClock`], which only moves when told to.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::types::Timestamp;

/// Source of the current time in whole seconds since the Unix epoch.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Shared handle to a clock implementation.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        // Pre-1970 system clocks are clamped rather than wrapped.
        Utc::now().timestamp().max(0) as Timestamp
    }
}

/// A clock that stands still until advanced.
///
/// Cheap to share behind an `Arc`; all operations are atomic.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Creates a clock frozen at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(SystemClock.now())
    }

    /// Moves the clock forward by `secs` and returns the new time.
    ///
    /// Saturates at `u64::MAX` instead of wrapping.
    pub fn advance(&self, secs: u64) -> Timestamp {
        let mut current = self.now.load(Ordering::SeqCst);
        loop {
            let next = current.saturating_add(secs);
            match self
                .now
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    /// Jumps to an absolute time. Going backwards is allowed; the ledger
    /// treats a clock that runs backwards as zero elapsed time.
    pub fn set(&self, ts: Timestamp) {
        self.now.store(ts, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_when_told() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        assert_eq!(clock.advance(10), 1_010);
        assert_eq!(clock.now(), 1_010);
        clock.set(5);
        assert_eq!(clock.now(), 5);
    }

    #[test]
    fn manual_clock_saturates() {
        let clock = ManualClock::new(u64::MAX - 1);
        assert_eq!(clock.advance(10), u64::MAX);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }

    #[test]
    fn shared_clock_is_object_safe() {
        let manual = Arc::new(ManualClock::new(42));
        let shared: SharedClock = manual.clone();
        manual.advance(1);
        assert_eq!(shared.now(), 43);
    }
}
