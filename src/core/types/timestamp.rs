//! Clock-tagged timestamps.
//!
//! A [`Timestamp`] is an immutable (nanoseconds, clock) pair. Arithmetic and
//! ordering between two timestamps is only meaningful when both carry the
//! same clock; mixing clocks without converting through the time graph is a
//! programmer defect and panics (never silently tolerated).

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use crate::core::time::Clock;

/// A point in time on a specific clock.
///
/// Nanoseconds are stored as `i64` (~292-year range). `nanos == 0` is the
/// "invalid" sentinel meaning "no observation yet", distinct from any real
/// reading.
#[derive(Clone)]
pub struct Timestamp {
    nanos: i64,
    clock: Clock,
}

impl Timestamp {
    /// Create a timestamp from a nanosecond reading on `clock`.
    pub fn new(nanos: i64, clock: Clock) -> Self {
        Timestamp { nanos, clock }
    }

    /// The invalid sentinel on `clock` (no observation yet).
    pub fn invalid(clock: Clock) -> Self {
        Timestamp { nanos: 0, clock }
    }

    /// Create from fractional seconds.
    pub fn from_seconds(seconds: f64, clock: Clock) -> Self {
        Timestamp::new((seconds * 1e9).round() as i64, clock)
    }

    /// Create from integer microseconds.
    pub fn from_micros(micros: i64, clock: Clock) -> Self {
        Timestamp::new(micros * 1_000, clock)
    }

    /// Whether this timestamp holds a real reading.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.nanos != 0
    }

    /// Nanosecond reading.
    #[inline]
    pub fn nanos(&self) -> i64 {
        self.nanos
    }

    /// The clock this timestamp was read from.
    #[inline]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Reading as fractional seconds.
    pub fn as_seconds(&self) -> f64 {
        self.nanos as f64 / 1e9
    }

    /// Reading as integer microseconds (truncated).
    pub fn as_micros(&self) -> i64 {
        self.nanos / 1_000
    }

    /// Offset by a signed number of nanoseconds, staying on the same clock.
    pub fn offset_ns(&self, offset: i64) -> Timestamp {
        Timestamp::new(self.nanos + offset, self.clock.clone())
    }

    /// Offset by a duration (forwards).
    pub fn after(&self, duration: Duration) -> Timestamp {
        self.offset_ns(duration.as_nanos() as i64)
    }

    /// Offset by a duration (backwards).
    pub fn before(&self, duration: Duration) -> Timestamp {
        self.offset_ns(-(duration.as_nanos() as i64))
    }

    /// Re-tag with a different clock, keeping the raw reading.
    ///
    /// Only time mappers should do this; everyone else converts through the
    /// time graph.
    pub(crate) fn retagged(&self, clock: Clock) -> Timestamp {
        Timestamp::new(self.nanos, clock)
    }

    /// Signed difference `self - other` in nanoseconds.
    ///
    /// Panics on clock mismatch.
    pub fn nanos_since(&self, other: &Timestamp) -> i64 {
        self.expect_clock(&other.clock);
        self.nanos - other.nanos
    }

    /// Assert that this timestamp was read from `clock`.
    ///
    /// Panics on mismatch; this is the ClockMismatch hard-fail path.
    #[track_caller]
    pub fn expect_clock(&self, clock: &Clock) {
        assert!(
            self.clock == *clock,
            "clock mismatch: timestamp from {:?}, expected {:?}",
            self.clock,
            clock
        );
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos && self.clock == other.clock
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    /// Panics on clock mismatch: ordering across clocks is undefined.
    #[track_caller]
    fn cmp(&self, other: &Self) -> Ordering {
        self.expect_clock(&other.clock);
        self.nanos.cmp(&other.nanos)
    }
}

impl std::hash::Hash for Timestamp {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.nanos.hash(state);
        self.clock.hash(state);
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}ns @ {:?})", self.nanos, self.clock)
    }
}

/// A value paired with the timestamp it was observed at.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    /// Observation time
    pub ts: Timestamp,
    /// The observed value
    pub value: T,
}

impl<T> Stamped<T> {
    /// Pair a value with its observation time.
    pub fn new(value: T, ts: Timestamp) -> Self {
        Stamped { ts, value }
    }

    /// Map the inner value while preserving the timestamp.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Stamped<U> {
        Stamped {
            ts: self.ts,
            value: f(self.value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::ManualClock;

    #[test]
    fn test_invalid_sentinel() {
        let c = Clock::monotonic();
        let t = Timestamp::invalid(c.clone());
        assert!(!t.is_valid());
        assert!(Timestamp::new(1, c).is_valid());
    }

    #[test]
    fn test_ordering_same_clock() {
        let c = Clock::monotonic();
        let a = Timestamp::new(100, c.clone());
        let b = Timestamp::new(200, c.clone());
        assert!(a < b);
        assert_eq!(b.nanos_since(&a), 100);
        assert_eq!(a.nanos_since(&b), -100);
    }

    #[test]
    #[should_panic(expected = "clock mismatch")]
    fn test_ordering_cross_clock_panics() {
        let a = Timestamp::new(100, Clock::monotonic());
        let b = Timestamp::new(200, Clock::wall());
        let _ = a < b;
    }

    #[test]
    fn test_offsets() {
        let c = Clock::monotonic();
        let t = Timestamp::new(1_000, c.clone());
        assert_eq!(t.offset_ns(50).nanos(), 1_050);
        assert_eq!(t.after(Duration::from_nanos(20)).nanos(), 1_020);
        assert_eq!(t.before(Duration::from_nanos(20)).nanos(), 980);
        assert_eq!(t.offset_ns(50).clock(), &c);
    }

    #[test]
    fn test_unit_conversions() {
        let c = Clock::wall();
        let t = Timestamp::from_seconds(1.5, c.clone());
        assert_eq!(t.nanos(), 1_500_000_000);
        assert_eq!(t.as_micros(), 1_500_000);
        assert_eq!(Timestamp::from_micros(42, c).nanos(), 42_000);
    }

    #[test]
    fn test_manual_clock_now() {
        let mc = ManualClock::new(123);
        let t = mc.now();
        assert_eq!(t.nanos(), 123);
        assert_eq!(t.clock(), &mc.clock());
    }
}
