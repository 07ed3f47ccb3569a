//! Invertible, composable conversions between clocks.
//!
//! A [`TimeMapper`] converts timestamps from its `a` clock to its `b` clock
//! by applying a (possibly dynamic) nanosecond offset and re-tagging the
//! result. Mappers form the edges of the [`TimeGraph`](super::TimeGraph);
//! each variant carries a conversion cost so the graph can prefer cheap,
//! stable conversions (identity < fixed offset < dynamically sampled offset).
//!
//! Feeding a mapper a timestamp from the wrong clock is a programmer defect
//! and panics.

use crate::core::time::Clock;
use crate::core::types::Timestamp;

/// Cost of an identity conversion.
const COST_IDENTITY: u32 = 2;
/// Cost of a constant-offset conversion.
const COST_FIXED: u32 = 10;
/// Cost of a conversion whose offset is re-sampled from both clocks on
/// every use.
const COST_DYNAMIC: u32 = 20;

/// Conversion between two clocks' instants.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeMapper {
    /// No-op conversion within one clock.
    Identity(Clock),
    /// Constant offset: `b = a + offset_ns`.
    FixedOffset {
        from: Clock,
        to: Clock,
        offset_ns: i64,
    },
    /// Offset sampled from both clocks at conversion time.
    Dynamic { from: Clock, to: Clock },
    /// Flipped view of another mapper.
    Inverse(Box<TimeMapper>),
    /// A contiguous chain of mappers applied in sequence.
    Chained(Vec<TimeMapper>),
}

impl TimeMapper {
    /// Fixed-offset mapper with a known offset.
    pub fn fixed(from: &Clock, to: &Clock, offset_ns: i64) -> Self {
        TimeMapper::FixedOffset {
            from: from.clone(),
            to: to.clone(),
            offset_ns,
        }
    }

    /// Fixed-offset mapper whose offset is estimated once by bracketing a
    /// read of `to` between two reads of `from` (cross-process device/host
    /// reconciliation).
    pub fn sampled(from: &Clock, to: &Clock) -> Self {
        let a1 = from.now_ns();
        let b = to.now_ns();
        let a2 = from.now_ns();
        TimeMapper::fixed(from, to, b - (a1 + a2) / 2)
    }

    /// Mapper from a fixed-offset clock's base to the clock itself.
    ///
    /// Returns `None` if `clock` is not a fixed-offset clock.
    pub fn for_offset_clock(clock: &Clock) -> Option<Self> {
        let base = clock.base()?;
        let offset_ns = clock.constant_offset_ns()?;
        Some(TimeMapper::FixedOffset {
            from: base.clone(),
            to: clock.clone(),
            offset_ns,
        })
    }

    /// The clock this mapper converts from.
    pub fn clock_a(&self) -> &Clock {
        match self {
            TimeMapper::Identity(c) => c,
            TimeMapper::FixedOffset { from, .. } => from,
            TimeMapper::Dynamic { from, .. } => from,
            TimeMapper::Inverse(inner) => inner.clock_b(),
            TimeMapper::Chained(steps) => steps[0].clock_a(),
        }
    }

    /// The clock this mapper converts to.
    pub fn clock_b(&self) -> &Clock {
        match self {
            TimeMapper::Identity(c) => c,
            TimeMapper::FixedOffset { to, .. } => to,
            TimeMapper::Dynamic { to, .. } => to,
            TimeMapper::Inverse(inner) => inner.clock_a(),
            TimeMapper::Chained(steps) => steps[steps.len() - 1].clock_b(),
        }
    }

    /// Current offset in nanoseconds, roughly `b - a`.
    pub fn offset_ns(&self) -> i64 {
        match self {
            TimeMapper::Identity(_) => 0,
            TimeMapper::FixedOffset { offset_ns, .. } => *offset_ns,
            TimeMapper::Dynamic { from, to } => to.now_ns() - from.now_ns(),
            TimeMapper::Inverse(inner) => -inner.offset_ns(),
            TimeMapper::Chained(steps) => steps.iter().map(|s| s.offset_ns()).sum(),
        }
    }

    /// Whether the offset never changes between uses.
    pub fn constant_offset(&self) -> bool {
        match self {
            TimeMapper::Identity(_) => true,
            TimeMapper::FixedOffset { .. } => true,
            TimeMapper::Dynamic { .. } => false,
            TimeMapper::Inverse(inner) => inner.constant_offset(),
            TimeMapper::Chained(steps) => steps.iter().all(|s| s.constant_offset()),
        }
    }

    /// Cost of applying this mapper, for shortest-path search. Always
    /// positive.
    pub fn cost(&self) -> u32 {
        match self {
            TimeMapper::Identity(_) => COST_IDENTITY,
            TimeMapper::FixedOffset { .. } => COST_FIXED,
            TimeMapper::Dynamic { .. } => COST_DYNAMIC,
            TimeMapper::Inverse(inner) => inner.cost() + 1,
            TimeMapper::Chained(steps) => steps.iter().map(|s| s.cost()).sum::<u32>() + 1,
        }
    }

    /// Convert a timestamp from clock `a` to clock `b`.
    ///
    /// Panics if `ts` is not from clock `a`.
    #[track_caller]
    pub fn a_to_b(&self, ts: &Timestamp) -> Timestamp {
        ts.expect_clock(self.clock_a());
        ts.offset_ns(self.offset_ns()).retagged(self.clock_b().clone())
    }

    /// Convert a timestamp from clock `b` back to clock `a`.
    ///
    /// Panics if `ts` is not from clock `b`.
    #[track_caller]
    pub fn b_to_a(&self, ts: &Timestamp) -> Timestamp {
        ts.expect_clock(self.clock_b());
        ts.offset_ns(-self.offset_ns()).retagged(self.clock_a().clone())
    }

    /// Invert this mapper. Involutive: `m.inverse().inverse() == m`.
    pub fn inverse(self) -> TimeMapper {
        match self {
            TimeMapper::Identity(c) => TimeMapper::Identity(c),
            TimeMapper::Inverse(inner) => *inner,
            other => TimeMapper::Inverse(Box::new(other)),
        }
    }

    /// Chain this mapper with another: `self` then `rhs`.
    ///
    /// Panics unless `self.clock_b() == rhs.clock_a()`. Nested chains are
    /// flattened and interior identity steps dropped.
    #[track_caller]
    pub fn then(self, rhs: TimeMapper) -> TimeMapper {
        assert!(
            self.clock_b() == rhs.clock_a(),
            "cannot chain mappers: {:?} != {:?}",
            self.clock_b(),
            rhs.clock_a()
        );
        let src = self.clock_a().clone();
        let mut steps = Vec::new();
        for part in [self, rhs] {
            match part {
                TimeMapper::Chained(inner) => steps.extend(inner),
                TimeMapper::Identity(_) => {}
                other => steps.push(other),
            }
        }
        if steps.is_empty() {
            // Both sides were identities.
            return TimeMapper::Identity(src);
        }
        TimeMapper::Chained(steps)
    }
}
