//! Registry and shortest-path resolver over time mappers.
//!
//! The [`TimeGraph`] keeps a directed mapping `clock → clock → mapper` and
//! answers "how do I convert an instant from clock A to clock B" by running
//! Dijkstra over the registered (and derivable) mappers, weighted by their
//! conversion cost. Resolved chains are cached as *derived* entries so
//! repeated conversions are cheap; derived entries never displace explicitly
//! registered ones.
//!
//! The graph is ambient state for one estimator task. It is deliberately not
//! synchronized: confine each graph to a single thread/task rather than
//! adding locks that would change observation ordering.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::ops::{Deref, DerefMut};

use log::{debug, trace};

use crate::core::time::{Clock, TimeMapper};
use crate::core::types::Timestamp;
use crate::error::{FusionError, Result};

#[derive(Debug, Clone)]
struct Entry {
    mapper: TimeMapper,
    /// Derived entries are synthesized (inverses, cached chains) and may be
    /// replaced or purged at any time.
    derived: bool,
}

/// Clock conversion registry with cheapest-path resolution.
#[derive(Debug, Default)]
pub struct TimeGraph {
    conversions: HashMap<Clock, HashMap<Clock, Entry>>,
}

impl TimeGraph {
    /// Empty graph. Identity conversions are always available.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapper, replacing any previous entry for its clock pair.
    ///
    /// Also installs the synthesized inverse mapping unless a directly
    /// registered one already exists, keeping the graph symmetric.
    pub fn register(&mut self, mapper: TimeMapper) {
        self.insert(mapper, false);
    }

    fn insert(&mut self, mapper: TimeMapper, derived: bool) {
        let a = mapper.clock_a().clone();
        let b = mapper.clock_b().clone();

        let from_a = self.conversions.entry(a.clone()).or_default();
        let replace_forward = match from_a.get(&b) {
            Some(prev) => !derived || prev.derived,
            None => true,
        };
        if replace_forward {
            from_a.insert(b.clone(), Entry { mapper: mapper.clone(), derived });
        }

        // Identity maps need no inverse entry.
        if a == b {
            return;
        }

        let from_b = self.conversions.entry(b).or_default();
        let replace_inverse = match from_b.get(&a) {
            Some(prev) => prev.derived,
            None => true,
        };
        if replace_inverse {
            from_b.insert(
                a,
                Entry {
                    mapper: mapper.inverse(),
                    derived: true,
                },
            );
        }
    }

    /// Drop all derived (cached/synthesized) entries.
    ///
    /// Registered mappers survive and their synthesized inverses are
    /// reinstalled; cached chains are rebuilt on demand.
    pub fn purge_derived(&mut self) {
        for from in self.conversions.values_mut() {
            from.retain(|_, entry| !entry.derived);
        }
        self.conversions.retain(|_, from| !from.is_empty());

        let registered: Vec<TimeMapper> = self
            .conversions
            .values()
            .flat_map(|from| from.values())
            .map(|entry| entry.mapper.clone())
            .collect();
        for mapper in registered {
            self.insert(mapper, false);
        }
    }

    /// Temporarily install a mapper, e.g. a device-clock mapping that is only
    /// valid while the device is attached.
    ///
    /// The returned guard dereferences to the graph; dropping it removes the
    /// mapping (and any caches built while it was live) and restores whatever
    /// it displaced.
    pub fn scoped(&mut self, mapper: TimeMapper) -> ScopedMapper<'_> {
        let a = mapper.clock_a().clone();
        let b = mapper.clock_b().clone();
        let saved = vec![
            (a.clone(), b.clone(), self.take_entry(&a, &b)),
            (b.clone(), a.clone(), self.take_entry(&b, &a)),
        ];
        self.register(mapper);
        ScopedMapper { graph: self, saved }
    }

    fn take_entry(&mut self, from: &Clock, to: &Clock) -> Option<Entry> {
        self.conversions.get_mut(from)?.remove(to)
    }

    fn restore_entry(&mut self, from: Clock, to: Clock, entry: Option<Entry>) {
        match entry {
            Some(entry) => {
                self.conversions.entry(from).or_default().insert(to, entry);
            }
            None => {
                if let Some(map) = self.conversions.get_mut(&from) {
                    map.remove(&to);
                }
            }
        }
    }

    /// All mappers leaving `src`, always including the identity.
    fn neighbors(&self, src: &Clock) -> Vec<TimeMapper> {
        let mut res: Vec<TimeMapper> = self
            .conversions
            .get(src)
            .map(|from| from.values().map(|e| e.mapper.clone()).collect())
            .unwrap_or_default();
        if !res.iter().any(|m| m.clock_b() == src) {
            res.push(TimeMapper::Identity(src.clone()));
        }
        res
    }

    /// Resolve the cheapest conversion chain from `src` to `dst`.
    ///
    /// The winning chain is cached as a derived entry. Returns `None` when
    /// the clocks are unreachable from each other; the caller should drop or
    /// skip the unconvertible timestamp.
    pub fn get_conversion(&mut self, src: &Clock, dst: &Clock) -> Option<TimeMapper> {
        if src == dst {
            return Some(TimeMapper::Identity(src.clone()));
        }

        // Dijkstra over mapper costs. `best` holds, per clock, the cheapest
        // known distance and the mapper that reaches it.
        let mut best: HashMap<Clock, (u32, TimeMapper)> = HashMap::new();
        let mut queue: BinaryHeap<QueueItem> = BinaryHeap::new();
        let mut seq = 0u64;
        queue.push(QueueItem { cost: 0, seq, clock: src.clone() });

        let dist = |best: &HashMap<Clock, (u32, TimeMapper)>, clock: &Clock| {
            best.get(clock).map(|(d, _)| *d).unwrap_or(u32::MAX)
        };

        while let Some(QueueItem { cost, clock, .. }) = queue.pop() {
            // Stale queue entries are skipped; a cheaper path was already
            // processed.
            if cost > dist(&best, &clock) && clock != *src {
                continue;
            }
            for neighbor in self.neighbors(&clock) {
                let next = neighbor.clock_b().clone();
                let next_cost = cost + neighbor.cost();
                if next_cost < dist(&best, &next) && next_cost < dist(&best, dst) {
                    best.insert(next.clone(), (next_cost, neighbor));
                    seq += 1;
                    queue.push(QueueItem { cost: next_cost, seq, clock: next });
                }
            }
        }

        best.get(dst)?;

        // Walk predecessors back from dst and fold the path into a chain.
        let mut path: Vec<TimeMapper> = Vec::new();
        let mut cursor = dst.clone();
        loop {
            let (_, mapper) = best
                .get(&cursor)
                .expect("predecessor chain must reach the source");
            path.push(mapper.clone());
            cursor = mapper.clock_a().clone();
            if cursor == *src {
                break;
            }
        }
        let mut chain = path.pop().expect("path is non-empty");
        while let Some(step) = path.pop() {
            chain = chain.then(step);
        }

        trace!(
            "[TimeGraph] resolved {:?} -> {:?} (cost {})",
            src,
            dst,
            chain.cost()
        );
        self.insert(chain.clone(), true);
        Some(chain)
    }

    /// Convert a timestamp onto `dst`, resolving through the graph.
    pub fn localize(&mut self, ts: &Timestamp, dst: &Clock) -> Result<Timestamp> {
        if ts.clock() == dst {
            return Ok(ts.clone());
        }
        match self.get_conversion(ts.clock(), dst) {
            Some(conv) => Ok(conv.a_to_b(ts)),
            None => {
                debug!(
                    "[TimeGraph] no conversion path {:?} -> {:?}",
                    ts.clock(),
                    dst
                );
                Err(FusionError::NoConversionPath(format!(
                    "{:?} -> {:?}",
                    ts.clock(),
                    dst
                )))
            }
        }
    }
}

/// Min-heap item for Dijkstra; clocks are not ordered so ties break on
/// insertion order.
struct QueueItem {
    cost: u32,
    seq: u64,
    clock: Clock,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.seq == other.seq
    }
}
impl Eq for QueueItem {}
impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for min-heap behavior in BinaryHeap.
        (other.cost, other.seq).cmp(&(self.cost, self.seq))
    }
}

/// RAII guard for a temporarily registered mapper.
///
/// Created by [`TimeGraph::scoped`].
pub struct ScopedMapper<'g> {
    graph: &'g mut TimeGraph,
    saved: Vec<(Clock, Clock, Option<Entry>)>,
}

impl Deref for ScopedMapper<'_> {
    type Target = TimeGraph;
    fn deref(&self) -> &TimeGraph {
        self.graph
    }
}

impl DerefMut for ScopedMapper<'_> {
    fn deref_mut(&mut self) -> &mut TimeGraph {
        self.graph
    }
}

impl Drop for ScopedMapper<'_> {
    fn drop(&mut self) {
        // Cached chains may route through the scoped mapper, so caches built
        // while the scope was live cannot be kept.
        self.graph.purge_derived();
        for (from, to, entry) in self.saved.drain(..).rev() {
            self.graph.restore_entry(from, to, entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::ManualClock;

    #[test]
    fn test_identity_always_available() {
        let mc = ManualClock::new(77);
        let mut graph = TimeGraph::new();
        let conv = graph.get_conversion(&mc.clock(), &mc.clock()).unwrap();
        let t0 = mc.now();
        assert_eq!(conv.a_to_b(&t0), t0);
    }

    #[test]
    fn test_direct_registration() {
        let a = ManualClock::new(1);
        let b = ManualClock::new(1);
        let mut graph = TimeGraph::new();
        graph.register(TimeMapper::fixed(&a.clock(), &b.clock(), 100));

        let conv = graph.get_conversion(&a.clock(), &b.clock()).unwrap();
        assert_eq!(conv.clock_a(), &a.clock());
        assert_eq!(conv.clock_b(), &b.clock());
        let t = Timestamp::new(500, a.clock());
        assert_eq!(conv.a_to_b(&t).nanos(), 600);
    }

    #[test]
    fn test_two_hop_path() {
        let c0 = ManualClock::new(1);
        let c1 = Clock::fixed_offset(&c0.clock(), 100);
        let c2 = Clock::fixed_offset(&c1, 200);
        let mut graph = TimeGraph::new();
        graph.register(TimeMapper::for_offset_clock(&c1).unwrap());
        graph.register(TimeMapper::for_offset_clock(&c2).unwrap());

        let conv = graph.get_conversion(&c0.clock(), &c2).unwrap();
        let t = Timestamp::new(1_000, c0.clock());
        let out = conv.a_to_b(&t);
        assert_eq!(out.nanos(), 1_300);
        assert_eq!(out.clock(), &c2);
    }

    #[test]
    fn test_reverse_path_via_synthesized_inverse() {
        let c0 = ManualClock::new(1);
        let c1 = Clock::fixed_offset(&c0.clock(), 100);
        let c2 = Clock::fixed_offset(&c1, 200);
        let mut graph = TimeGraph::new();
        graph.register(TimeMapper::for_offset_clock(&c1).unwrap());
        graph.register(TimeMapper::for_offset_clock(&c2).unwrap());

        let conv = graph.get_conversion(&c2, &c0.clock()).unwrap();
        let t = Timestamp::new(1_300, c2.clone());
        let out = conv.a_to_b(&t);
        assert_eq!(out.nanos(), 1_000);
        assert_eq!(out.clock(), &c0.clock());
    }

    #[test]
    fn test_redundant_higher_cost_path_ignored() {
        let c0 = ManualClock::new(1);
        let c1 = ManualClock::new(1);
        let c2 = ManualClock::new(1);
        let mut graph = TimeGraph::new();
        graph.register(TimeMapper::fixed(&c0.clock(), &c2.clock(), 300));
        // Redundant two-hop route, deliberately inconsistent (100 + 150):
        // it costs more than the direct edge, so the answer must not move.
        graph.register(TimeMapper::fixed(&c0.clock(), &c1.clock(), 100));
        graph.register(TimeMapper::fixed(&c1.clock(), &c2.clock(), 150));

        let conv = graph.get_conversion(&c0.clock(), &c2.clock()).unwrap();
        let t = Timestamp::new(1_000, c0.clock());
        assert_eq!(conv.a_to_b(&t).nanos(), 1_300);
    }

    #[test]
    fn test_no_path() {
        let a = ManualClock::new(1);
        let b = ManualClock::new(1);
        let mut graph = TimeGraph::new();
        assert!(graph.get_conversion(&a.clock(), &b.clock()).is_none());
        let ts = a.now();
        assert!(matches!(
            graph.localize(&ts, &b.clock()),
            Err(FusionError::NoConversionPath(_))
        ));
    }

    #[test]
    fn test_localize_same_clock() {
        let a = ManualClock::new(10);
        let mut graph = TimeGraph::new();
        let ts = a.now();
        assert_eq!(graph.localize(&ts, &a.clock()).unwrap(), ts);
    }

    #[test]
    fn test_conversion_cached_as_derived() {
        let c0 = ManualClock::new(1);
        let c1 = Clock::fixed_offset(&c0.clock(), 100);
        let c2 = Clock::fixed_offset(&c1, 200);
        let mut graph = TimeGraph::new();
        graph.register(TimeMapper::for_offset_clock(&c1).unwrap());
        graph.register(TimeMapper::for_offset_clock(&c2).unwrap());

        graph.get_conversion(&c0.clock(), &c2).unwrap();
        // The resolved chain is now a direct entry.
        let entry = &graph.conversions[&c0.clock()][&c2];
        assert!(entry.derived);
        assert_eq!(entry.mapper.offset_ns(), 300);
    }

    #[test]
    fn test_scoped_mapper_removed_on_drop() {
        let a = ManualClock::new(1);
        let device = ManualClock::new(1);
        let mut graph = TimeGraph::new();

        {
            let mut scope = graph.scoped(TimeMapper::fixed(&a.clock(), &device.clock(), 5));
            assert!(scope.get_conversion(&a.clock(), &device.clock()).is_some());
            assert!(scope.get_conversion(&device.clock(), &a.clock()).is_some());
        }
        assert!(graph.get_conversion(&a.clock(), &device.clock()).is_none());
    }

    #[test]
    fn test_scoped_mapper_restores_displaced_entry() {
        let a = ManualClock::new(1);
        let b = ManualClock::new(1);
        let mut graph = TimeGraph::new();
        graph.register(TimeMapper::fixed(&a.clock(), &b.clock(), 10));

        {
            let mut scope = graph.scoped(TimeMapper::fixed(&a.clock(), &b.clock(), 99));
            let conv = scope.get_conversion(&a.clock(), &b.clock()).unwrap();
            assert_eq!(conv.offset_ns(), 99);
        }
        let conv = graph.get_conversion(&a.clock(), &b.clock()).unwrap();
        assert_eq!(conv.offset_ns(), 10);
    }

    #[test]
    fn test_nested_scopes() {
        let c0 = ManualClock::new(1);
        let c1 = Clock::fixed_offset(&c0.clock(), 100);
        let c2 = Clock::fixed_offset(&c1, 200);
        let mut graph = TimeGraph::new();

        assert!(graph.get_conversion(&c0.clock(), &c1).is_none());
        {
            let mut outer = graph.scoped(TimeMapper::for_offset_clock(&c1).unwrap());
            assert!(outer.get_conversion(&c0.clock(), &c1).is_some());
            assert!(outer.get_conversion(&c0.clock(), &c2).is_none());
            {
                let mut inner = outer.scoped(TimeMapper::for_offset_clock(&c2).unwrap());
                assert!(inner.get_conversion(&c0.clock(), &c1).is_some());
                assert!(inner.get_conversion(&c0.clock(), &c2).is_some());
            }
            assert!(outer.get_conversion(&c0.clock(), &c2).is_none());
        }
        assert!(graph.get_conversion(&c0.clock(), &c1).is_none());
    }
}
