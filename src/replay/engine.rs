//! Out-of-order measurement scheduler with rewind and replay.
//!
//! Measurements from independently timed producers can arrive behind the
//! filter's last-processed time. Dropping them loses data and applying them
//! out of order corrupts the filter, so the engine checkpoints the filter
//! after each applied measurement and, when a late one shows up, rewinds to
//! the newest snapshot preceding it and replays everything since in
//! timestamp order.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;

use log::{trace, warn};
use serde::{Deserialize, Serialize};

use super::filter::{HasTimestamp, ReplayableFilter};
use crate::core::types::Timestamp;

/// Rewind targets land this far before the late measurement, so the replay
/// includes it. Assumes no two distinct measurements share a timestamp
/// within this window.
pub const REWIND_EPSILON: Duration = Duration::from_micros(1);

/// Tuning for a [`ReplayEngine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Rewind and replay late measurements. When disabled, late
    /// measurements are applied in arrival order and no history is kept.
    pub smooth_lagged_data: bool,
    /// Seconds of snapshot/measurement history retained for rewinds.
    pub history_duration: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig {
            smooth_lagged_data: true,
            history_duration: 8.0,
        }
    }
}

struct QueuedMeasurement<M> {
    seq: u64,
    measurement: M,
}

impl<M: HasTimestamp> QueuedMeasurement<M> {
    fn key(&self) -> (i64, u64) {
        (self.measurement.ts().nanos(), self.seq)
    }
}

impl<M: HasTimestamp> PartialEq for QueuedMeasurement<M> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<M: HasTimestamp> Eq for QueuedMeasurement<M> {}

impl<M: HasTimestamp> PartialOrd for QueuedMeasurement<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M: HasTimestamp> Ord for QueuedMeasurement<M> {
    // Reversed so the std max-heap pops the earliest timestamp; ties break
    // by arrival order.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

/// Drives a [`ReplayableFilter`] with measurements in timestamp order
/// regardless of arrival order.
pub struct ReplayEngine<F: ReplayableFilter> {
    filter: F,
    config: ReplayConfig,
    queue: BinaryHeap<QueuedMeasurement<F::Measurement>>,
    next_seq: u64,
    /// Post-apply checkpoints, ascending, one per distinct timestamp.
    snapshots: VecDeque<F::Snapshot>,
    /// Applied measurements, ascending, for re-enqueue after a rewind.
    history: VecDeque<F::Measurement>,
}

impl<F: ReplayableFilter> ReplayEngine<F> {
    pub fn new(filter: F, config: ReplayConfig) -> Self {
        ReplayEngine {
            filter,
            config,
            queue: BinaryHeap::new(),
            next_seq: 0,
            snapshots: VecDeque::new(),
            history: VecDeque::new(),
        }
    }

    pub fn filter(&self) -> &F {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut F {
        &mut self.filter
    }

    /// Number of measurements waiting for the next poll.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Enqueue a measurement. Non-blocking; takes effect on the next
    /// [`poll`](Self::poll) whose `now` has reached its timestamp.
    ///
    /// Panics if the measurement's clock is not the filter's clock: the
    /// queue orders by raw nanosecond readings, which are only comparable
    /// on one clock. Convert through the time graph first.
    #[track_caller]
    pub fn observe(&mut self, measurement: F::Measurement) {
        let last = self.filter.last_measurement_ts();
        measurement.ts().expect_clock(last.clock());
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(QueuedMeasurement { seq, measurement });
    }

    /// Drop all pending measurements and history. The filter itself is not
    /// reset.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.snapshots.clear();
        self.history.clear();
    }

    /// Integrate everything due at `now`.
    ///
    /// Rewinds first if smoothing is on and the earliest queued measurement
    /// is behind the filter, then applies due measurements in timestamp
    /// order, then dead-reckons forward if the sensors have gone quiet,
    /// then trims history to the configured horizon.
    ///
    /// Panics if `now` is not on the filter's clock.
    #[track_caller]
    pub fn poll(&mut self, now: &Timestamp) {
        now.expect_clock(self.filter.last_measurement_ts().clock());
        if self.config.smooth_lagged_data && self.filter.is_initialized() {
            if let Some(head) = self.queue.peek() {
                let last = self.filter.last_measurement_ts();
                if last.is_valid() && head.measurement.ts().nanos() < last.nanos() {
                    let target = head.measurement.ts().before(REWIND_EPSILON);
                    self.revert_to(&target);
                }
            }
        }

        while self
            .queue
            .peek()
            .map_or(false, |q| q.measurement.ts().nanos() <= now.nanos())
        {
            let measurement = match self.queue.pop() {
                Some(q) => q.measurement,
                None => break,
            };
            self.apply(measurement);
        }

        let last = self.filter.last_measurement_ts();
        if self.queue.is_empty() && self.filter.is_initialized() && last.is_valid() {
            let elapsed = now.nanos_since(&last);
            if elapsed >= 0 && elapsed as u128 >= self.filter.sensor_timeout().as_nanos() {
                trace!("[ReplayEngine] sensors quiet for {}ns, dead reckoning", elapsed);
                self.filter.predict(now, Duration::from_nanos(elapsed as u64));
            }
        }

        self.trim(now);
    }

    fn apply(&mut self, measurement: F::Measurement) {
        let ts = measurement.ts().clone();
        let last = self.filter.last_measurement_ts();
        let advances = !last.is_valid() || ts.nanos() > last.nanos();
        if last.is_valid() && ts.nanos() > last.nanos() {
            let delta = Duration::from_nanos(ts.nanos_since(&last) as u64);
            self.filter.predict(&ts, delta);
        }
        self.filter.observe(&measurement);
        if advances {
            self.filter.set_last_measurement_ts(ts);
        }
        if self.config.smooth_lagged_data {
            self.archive(measurement);
        }
    }

    fn archive(&mut self, measurement: F::Measurement) {
        let snapshot = self.filter.snapshot();
        match self.snapshots.back_mut() {
            Some(back) if back.ts().nanos() == snapshot.ts().nanos() => *back = snapshot,
            _ => self.snapshots.push_back(snapshot),
        }
        self.history.push_back(measurement);
    }

    /// Restore the newest snapshot at or before `target` and re-enqueue all
    /// archived measurements past it.
    ///
    /// Failure (no snapshot old enough) is degraded operation, not an
    /// error: the late measurement will be applied in arrival order.
    fn revert_to(&mut self, target: &Timestamp) -> bool {
        let pos = self
            .snapshots
            .iter()
            .rposition(|s| s.ts().nanos() <= target.nanos());
        let Some(pos) = pos else {
            warn!(
                "[ReplayEngine] no snapshot at or before {:?}; history too short, \
                 applying in arrival order",
                target
            );
            return false;
        };
        self.snapshots.truncate(pos + 1);
        let snap_nanos = {
            let snapshot = &self.snapshots[pos];
            trace!("[ReplayEngine] rewinding to snapshot at {:?}", snapshot.ts());
            self.filter.restore(snapshot);
            snapshot.ts().nanos()
        };
        while self
            .history
            .back()
            .map_or(false, |m| m.ts().nanos() > snap_nanos)
        {
            if let Some(measurement) = self.history.pop_back() {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.queue.push(QueuedMeasurement { seq, measurement });
            }
        }
        true
    }

    fn trim(&mut self, now: &Timestamp) {
        let cutoff = now.nanos() - (self.config.history_duration * 1e9) as i64;
        while self
            .snapshots
            .front()
            .map_or(false, |s| s.ts().nanos() < cutoff)
        {
            self.snapshots.pop_front();
        }
        while self
            .history
            .front()
            .map_or(false, |m| m.ts().nanos() < cutoff)
        {
            self.history.pop_front();
        }
    }
}
