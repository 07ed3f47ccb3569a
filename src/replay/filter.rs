//! Contract a stateful estimator satisfies to be driven by the replay
//! engine.

use std::time::Duration;

use crate::core::types::Timestamp;

/// Anything carrying an observation time.
pub trait HasTimestamp {
    fn ts(&self) -> &Timestamp;
}

impl<T> HasTimestamp for crate::core::types::Stamped<T> {
    fn ts(&self) -> &Timestamp {
        &self.ts
    }
}

/// A stateful filter whose state can be checkpointed and rewound.
///
/// The engine owns measurement ordering; the filter only ever sees
/// `predict`/`observe` calls and must be able to jump back to any snapshot
/// it previously handed out. `restore` must leave the filter exactly as it
/// was when the snapshot was taken, including its last-measurement time.
pub trait ReplayableFilter {
    /// One sensor reading, tagged with its observation time.
    type Measurement: HasTimestamp + Clone;
    /// Opaque checkpoint of the full filter state.
    type Snapshot: HasTimestamp + Clone;

    /// Whether any measurement has ever been absorbed.
    fn is_initialized(&self) -> bool;

    /// Observation time of the newest absorbed measurement (invalid sentinel
    /// before the first one).
    fn last_measurement_ts(&self) -> Timestamp;
    fn set_last_measurement_ts(&mut self, ts: Timestamp);

    /// How long without measurements before the engine dead-reckons forward.
    fn sensor_timeout(&self) -> Duration;

    fn snapshot(&self) -> Self::Snapshot;
    fn restore(&mut self, snapshot: &Self::Snapshot);

    /// Advance internal state to `now`; `delta` is the time since the last
    /// absorbed measurement.
    fn predict(&mut self, now: &Timestamp, delta: Duration);

    /// Absorb one measurement.
    fn observe(&mut self, measurement: &Self::Measurement);
}
