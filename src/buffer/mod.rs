//! Horizon-bounded interpolating sample buffer.
//!
//! [`InterpolatingBuffer`] keeps a key-ordered window of samples and answers
//! point queries by exact match, linear interpolation between the bracketing
//! pair, or flat extrapolation from the nearest edge. Entries older than
//! `latest key - horizon` are evicted on write, not by a timer.
//!
//! [`InterpolatingBuffer::track`] hands out a memoized [`Tracked`] view of a
//! query that stays fresh across writes which do not move its bracketing
//! pair. Pose histories update at tens of hertz while a correction consumer
//! only cares about a fixed instant; pinning the bracket avoids recomputing
//! the correction on every unrelated write.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::core::types::{lerp_pose3d, lerp_transform3d, Pose3D, Timestamp, Transform3D};
use crate::tracked::{Node, Tracked};

/// Ordered key usable for buffer placement and interpolation.
pub trait BufferKey: Clone + Ord {
    /// Step backwards by a signed delta (the horizon unit).
    fn back(&self, delta: i64) -> Self;
    /// Position of `self` within `[low, high]` as a fraction in `[0, 1]`.
    fn fraction(&self, low: &Self, high: &Self) -> f64;
}

impl BufferKey for i64 {
    fn back(&self, delta: i64) -> Self {
        self - delta
    }
    fn fraction(&self, low: &Self, high: &Self) -> f64 {
        let span = high - low;
        if span == 0 {
            return 0.0;
        }
        (self - low) as f64 / span as f64
    }
}

impl BufferKey for Timestamp {
    fn back(&self, delta: i64) -> Self {
        self.offset_ns(-delta)
    }
    fn fraction(&self, low: &Self, high: &Self) -> f64 {
        let span = high.nanos_since(low);
        if span == 0 {
            return 0.0;
        }
        self.nanos_since(low) as f64 / span as f64
    }
}

/// Values a buffer knows how to blend between two samples.
pub trait Interpolate: Clone {
    /// Blend from `a` (t = 0) to `b` (t = 1).
    fn interpolate(a: &Self, b: &Self, t: f64) -> Self;
}

impl Interpolate for f64 {
    fn interpolate(a: &Self, b: &Self, t: f64) -> Self {
        a + (b - a) * t
    }
}

impl Interpolate for Pose3D {
    fn interpolate(a: &Self, b: &Self, t: f64) -> Self {
        lerp_pose3d(a, b, t)
    }
}

impl Interpolate for Transform3D {
    fn interpolate(a: &Self, b: &Self, t: f64) -> Self {
        lerp_transform3d(a, b, t)
    }
}

struct Inner<K, V> {
    samples: BTreeMap<K, V>,
    /// Bumped on every mutation; lets tracked views short-circuit freshness.
    modcount: u64,
}

/// Key-ordered sample window with interpolated lookup.
pub struct InterpolatingBuffer<K: BufferKey, V> {
    inner: Rc<RefCell<Inner<K, V>>>,
    horizon: Option<i64>,
}

impl<K: BufferKey, V> Clone for InterpolatingBuffer<K, V> {
    fn clone(&self) -> Self {
        InterpolatingBuffer {
            inner: Rc::clone(&self.inner),
            horizon: self.horizon,
        }
    }
}

impl<K, V> InterpolatingBuffer<K, V>
where
    K: BufferKey + 'static,
    V: Interpolate + PartialEq + 'static,
{
    /// Create a buffer retaining samples within `horizon` of the newest key
    /// (`None` retains everything).
    pub fn new(horizon: Option<i64>) -> Self {
        InterpolatingBuffer {
            inner: Rc::new(RefCell::new(Inner {
                samples: BTreeMap::new(),
                modcount: 0,
            })),
            horizon,
        }
    }

    /// Insert a sample, evicting entries older than `key - horizon` first.
    pub fn add(&self, key: K, value: V) {
        let mut inner = self.inner.borrow_mut();
        if let Some(horizon) = self.horizon {
            let cutoff = key.back(horizon);
            inner.samples = inner.samples.split_off(&cutoff);
        }
        inner.samples.insert(key, value);
        inner.modcount += 1;
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().samples.is_empty()
    }

    /// Drop all samples.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.samples.clear();
        inner.modcount += 1;
    }

    /// Oldest retained (key, value).
    pub fn first(&self) -> Option<(K, V)> {
        let inner = self.inner.borrow();
        inner
            .samples
            .first_key_value()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Newest retained (key, value).
    pub fn latest(&self) -> Option<(K, V)> {
        let inner = self.inner.borrow();
        inner
            .samples
            .last_key_value()
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    /// Query at `key`: exact sample, interpolation between the bracketing
    /// pair, or the nearest edge sample. `None` only when empty.
    pub fn sample(&self, key: &K) -> Option<V> {
        let inner = self.inner.borrow();
        Bracket::capture(&inner.samples, key).sample_at(key)
    }

    /// Like [`sample`](Self::sample) but substituting `default` when empty.
    pub fn get(&self, key: &K, default: V) -> V {
        self.sample(key).unwrap_or(default)
    }

    /// Memoized view of `get(key, default)`.
    ///
    /// Stays fresh across writes that do not move the query's bracketing
    /// pair, so downstream derived values skip recomputation while the
    /// answer cannot have changed.
    pub fn track(&self, key: K, default: V) -> Tracked<V> {
        Tracked::from_node(Rc::new(TrackedSample {
            inner: Rc::clone(&self.inner),
            key,
            default,
            captured: RefCell::new(None),
        }))
    }
}

/// How a query key relates to the stored samples.
#[derive(Clone, PartialEq)]
enum Bracket<K, V> {
    Empty,
    Exact(K, V),
    Edge(K, V),
    Interior((K, V), (K, V)),
}

impl<K: BufferKey, V: Interpolate + PartialEq> Bracket<K, V> {
    fn capture(samples: &BTreeMap<K, V>, key: &K) -> Self {
        let below = samples.range(..=key.clone()).next_back();
        let above = samples.range(key.clone()..).next();
        match (below, above) {
            (None, None) => Bracket::Empty,
            (Some((k, v)), _) if k == key => Bracket::Exact(k.clone(), v.clone()),
            (Some((bk, bv)), Some((ak, av))) => Bracket::Interior(
                (bk.clone(), bv.clone()),
                (ak.clone(), av.clone()),
            ),
            (Some((k, v)), None) | (None, Some((k, v))) => Bracket::Edge(k.clone(), v.clone()),
        }
    }

    fn sample_at(&self, key: &K) -> Option<V> {
        match self {
            Bracket::Empty => None,
            Bracket::Exact(_, v) | Bracket::Edge(_, v) => Some(v.clone()),
            Bracket::Interior((lk, lv), (hk, hv)) => {
                Some(V::interpolate(lv, hv, key.fraction(lk, hk)))
            }
        }
    }

    fn is_interior(&self) -> bool {
        matches!(self, Bracket::Interior(..))
    }
}

struct Captured<K, V> {
    modcount: u64,
    bracket: Bracket<K, V>,
    value: Option<V>,
}

struct TrackedSample<K: BufferKey, V> {
    inner: Rc<RefCell<Inner<K, V>>>,
    key: K,
    default: V,
    captured: RefCell<Option<Captured<K, V>>>,
}

impl<K, V> TrackedSample<K, V>
where
    K: BufferKey,
    V: Interpolate + PartialEq,
{
    fn capture(&self) -> Captured<K, V> {
        let inner = self.inner.borrow();
        let bracket = Bracket::capture(&inner.samples, &self.key);
        let value = bracket.sample_at(&self.key);
        Captured {
            modcount: inner.modcount,
            bracket,
            value,
        }
    }

    fn resolve(&self, value: &Option<V>) -> V {
        value.clone().unwrap_or_else(|| self.default.clone())
    }
}

impl<K, V> Node<V> for TrackedSample<K, V>
where
    K: BufferKey,
    V: Interpolate + Clone + PartialEq,
{
    fn value(&self) -> V {
        let mut captured = self.captured.borrow_mut();
        match captured.as_ref() {
            Some(c) => self.resolve(&c.value),
            None => {
                let fresh = self.capture();
                let out = self.resolve(&fresh.value);
                *captured = Some(fresh);
                out
            }
        }
    }

    fn is_fresh(&self) -> bool {
        let captured = self.captured.borrow();
        let Some(c) = captured.as_ref() else {
            return true;
        };
        if self.inner.borrow().modcount == c.modcount {
            return true;
        }
        let inner = self.inner.borrow();
        Bracket::capture(&inner.samples, &self.key) == c.bracket
    }

    fn is_constant(&self) -> bool {
        false
    }

    fn refresh(&self) {
        let fresh = self.capture();
        let mut captured = self.captured.borrow_mut();
        if let Some(old) = captured.as_ref() {
            // A query that once interpolated between two samples does not
            // drop back to an edge sample when the far side of its bracket
            // is evicted; the older interpolated value stays.
            if old.bracket.is_interior() && !fresh.bracket.is_interior() {
                return;
            }
        }
        *captured = Some(fresh);
    }
}
