//! Clocks that stamp visit entries and sweep cutoffs.

use crate::types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of timestamps for entry keys and sweep cutoffs.
pub trait Clock: Send + Sync {
    /// Current timestamp
    fn now(&self) -> Timestamp;
}

/// Wall clock truncated to a fixed resolution.
///
/// Two writers stamping within the same tick get the same key, which is
/// what the collision retry exists for.
#[derive(Clone, Debug)]
pub struct SystemClock {
    resolution_nanos: u64,
}

impl SystemClock {
    /// Clock with the given tick; a zero resolution means nanosecond ticks
    #[must_use]
    pub fn with_resolution(resolution: Duration) -> Self {
        let nanos = u64::try_from(resolution.as_nanos()).unwrap_or(u64::MAX);
        Self {
            resolution_nanos: nanos.max(1),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::with_resolution(Duration::from_micros(1))
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
        Timestamp::from_nanos(nanos - nanos % self.resolution_nanos)
    }
}

/// Manually driven clock for tests and deterministic sweeps
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Clock frozen at `start`
    #[must_use]
    pub const fn new(start: Timestamp) -> Self {
        Self {
            nanos: AtomicU64::new(start.as_nanos()),
        }
    }

    /// Jump to `to`
    pub fn set(&self, to: Timestamp) {
        self.nanos.store(to.as_nanos(), Ordering::SeqCst);
    }

    /// Move forward by `by`
    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_truncates_to_resolution() {
        let clock = SystemClock::with_resolution(Duration::from_millis(1));
        let now = clock.now().as_nanos();
        assert_eq!(now % 1_000_000, 0);
        assert!(now > 0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(Timestamp::from_nanos(10));
        assert_eq!(clock.now(), Timestamp::from_nanos(10));
        clock.advance(Duration::from_nanos(5));
        assert_eq!(clock.now(), Timestamp::from_nanos(15));
        clock.set(Timestamp::from_nanos(2));
        assert_eq!(clock.now(), Timestamp::from_nanos(2));
    }
}
