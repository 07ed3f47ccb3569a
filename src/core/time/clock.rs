//! Clock sources.
//!
//! Every [`Timestamp`] is tagged with the clock that produced it. Clocks are
//! cheap handles (`Arc` inside) with identity semantics that matter for the
//! time graph: the monotonic and wall clocks behave as process-wide
//! singletons (all handles compare equal), fixed-offset clocks compare by
//! value (base + offset), and manual test clocks compare by pointer.
//!
//! `now()` only reads shared state and may be called concurrently from any
//! thread, even though the rest of the fusion core is single-threaded.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::core::types::Timestamp;

/// Anchor for the process-wide monotonic clock. Monotonic readings are
/// nanoseconds since the first read in this process.
static MONO_ANCHOR: OnceLock<Instant> = OnceLock::new();

#[derive(Debug)]
enum ClockKind {
    /// Process-wide monotonic clock (nanoseconds since first read).
    Monotonic,
    /// Wall clock (nanoseconds since the UNIX epoch).
    Wall,
    /// A clock derived from `base` by a constant offset.
    FixedOffset { base: Clock, offset_ns: i64 },
    /// Manually driven clock for tests and simulation.
    Manual { ticks: AtomicI64 },
}

/// Handle to a clock source.
///
/// Nanosecond range of an `i64` covers ~292 years, which is sufficient for
/// both monotonic (process-relative) and wall (epoch-relative) readings.
#[derive(Clone)]
pub struct Clock(Arc<ClockKind>);

impl Clock {
    /// The process-wide monotonic clock.
    pub fn monotonic() -> Self {
        Clock(Arc::new(ClockKind::Monotonic))
    }

    /// The wall clock (UNIX epoch).
    pub fn wall() -> Self {
        Clock(Arc::new(ClockKind::Wall))
    }

    /// A clock offset from `base` by a constant number of nanoseconds.
    pub fn fixed_offset(base: &Clock, offset_ns: i64) -> Self {
        Clock(Arc::new(ClockKind::FixedOffset {
            base: base.clone(),
            offset_ns,
        }))
    }

    /// Derive a fixed-offset clock from `base` that tracks `target`.
    ///
    /// The one-time offset is estimated by bracketing a single read of
    /// `target` between two reads of `base`, which bounds the sampling skew
    /// by half the bracket width. This is how device clocks from other
    /// processes are reconciled against the host clock.
    pub fn fixed_offset_sampled(base: &Clock, target: &Clock) -> Self {
        let a1 = base.now_ns();
        let b = target.now_ns();
        let a2 = base.now_ns();
        let offset_ns = b - (a1 + a2) / 2;
        Self::fixed_offset(base, offset_ns)
    }

    /// Current reading in nanoseconds.
    pub fn now_ns(&self) -> i64 {
        match &*self.0 {
            ClockKind::Monotonic => {
                let anchor = MONO_ANCHOR.get_or_init(Instant::now);
                anchor.elapsed().as_nanos() as i64
            }
            ClockKind::Wall => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as i64)
                .unwrap_or(0),
            ClockKind::FixedOffset { base, offset_ns } => base.now_ns() + offset_ns,
            ClockKind::Manual { ticks } => ticks.load(Ordering::SeqCst),
        }
    }

    /// Current reading as a [`Timestamp`] tagged with this clock.
    pub fn now(&self) -> Timestamp {
        Timestamp::new(self.now_ns(), self.clone())
    }

    /// The constant offset of a fixed-offset clock relative to its base.
    pub fn constant_offset_ns(&self) -> Option<i64> {
        match &*self.0 {
            ClockKind::FixedOffset { offset_ns, .. } => Some(*offset_ns),
            _ => None,
        }
    }

    /// The base clock of a fixed-offset clock.
    pub fn base(&self) -> Option<&Clock> {
        match &*self.0 {
            ClockKind::FixedOffset { base, .. } => Some(base),
            _ => None,
        }
    }

    fn discriminant(&self) -> u8 {
        match &*self.0 {
            ClockKind::Monotonic => 0,
            ClockKind::Wall => 1,
            ClockKind::FixedOffset { .. } => 2,
            ClockKind::Manual { .. } => 3,
        }
    }
}

impl PartialEq for Clock {
    fn eq(&self, other: &Self) -> bool {
        match (&*self.0, &*other.0) {
            (ClockKind::Monotonic, ClockKind::Monotonic) => true,
            (ClockKind::Wall, ClockKind::Wall) => true,
            (
                ClockKind::FixedOffset { base: b1, offset_ns: o1 },
                ClockKind::FixedOffset { base: b2, offset_ns: o2 },
            ) => o1 == o2 && b1 == b2,
            (ClockKind::Manual { .. }, ClockKind::Manual { .. }) => {
                Arc::ptr_eq(&self.0, &other.0)
            }
            _ => false,
        }
    }
}

impl Eq for Clock {}

impl Hash for Clock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.discriminant());
        match &*self.0 {
            ClockKind::FixedOffset { base, offset_ns } => {
                base.hash(state);
                state.write_i64(*offset_ns);
            }
            ClockKind::Manual { .. } => {
                state.write_usize(Arc::as_ptr(&self.0) as *const () as usize);
            }
            _ => {}
        }
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            ClockKind::Monotonic => write!(f, "Monotonic"),
            ClockKind::Wall => write!(f, "Wall"),
            ClockKind::FixedOffset { base, offset_ns } => {
                let sign = if *offset_ns >= 0 { '+' } else { '-' };
                write!(f, "FixedOffset({:?} {} {}ns)", base, sign, offset_ns.abs())
            }
            ClockKind::Manual { .. } => {
                write!(f, "Manual({:p})", Arc::as_ptr(&self.0))
            }
        }
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Manually driven clock for tests and simulation.
///
/// The handle owns the tick counter; [`ManualClock::clock`] hands out `Clock`
/// views with pointer identity (two separate manual clocks never compare
/// equal).
#[derive(Debug, Clone)]
pub struct ManualClock {
    clock: Clock,
}

impl ManualClock {
    /// Create a manual clock starting at `start_ns`.
    pub fn new(start_ns: i64) -> Self {
        ManualClock {
            clock: Clock(Arc::new(ClockKind::Manual {
                ticks: AtomicI64::new(start_ns),
            })),
        }
    }

    /// The `Clock` view of this manual clock.
    pub fn clock(&self) -> Clock {
        self.clock.clone()
    }

    /// Set the current reading.
    pub fn set_ns(&self, nanos: i64) {
        match &*self.clock.0 {
            ClockKind::Manual { ticks } => ticks.store(nanos, Ordering::SeqCst),
            _ => unreachable!(),
        }
    }

    /// Advance the current reading.
    pub fn advance_ns(&self, nanos: i64) {
        match &*self.clock.0 {
            ClockKind::Manual { ticks } => {
                ticks.fetch_add(nanos, Ordering::SeqCst);
            }
            _ => unreachable!(),
        }
    }

    /// Advance the current reading by a duration.
    pub fn advance(&self, duration: Duration) {
        self.advance_ns(duration.as_nanos() as i64);
    }

    /// Current reading as a timestamp.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        // Start at 1ns so `now()` is a valid timestamp from the start.
        Self::new(1)
    }
}
