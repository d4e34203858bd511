//! Vector clocks used only to *construct* `DAGs`-shaped trace graphs
//! (spec §4.1). Each event in a partially-ordered log carries a vector
//! clock; a transition `u -> v` is added iff `clock(v)` immediately
//! succeeds `clock(u)` under the componentwise partial order, i.e. there is
//! no event whose clock sits strictly between the two.
//!
//! This is deliberately separate from [`crate::time::Timestamp`]: vector
//! clocks only ever drive DAG construction, never the per-event scalar time
//! carried by an [`crate::event::Event`].

use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A stable identifier for one process/thread contributing to a
/// partially-ordered trace.
pub type ProcessId = u32;

/// A vector clock: one logical counter per process.
///
/// Missing entries are treated as `0`, so clocks from traces with a
/// different set of observed processes still compare sensibly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorClock {
    counters: BTreeMap<ProcessId, u64>,
}

impl VectorClock {
    /// An all-zero clock.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Builds a clock directly from `(process, counter)` pairs.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (ProcessId, u64)>) -> Self {
        Self {
            counters: pairs.into_iter().collect(),
        }
    }

    /// The counter for `process`, or `0` if unobserved.
    pub fn get(&self, process: ProcessId) -> u64 {
        self.counters.get(&process).copied().unwrap_or(0)
    }

    /// Returns a copy with `process`'s counter incremented by one.
    pub fn incremented(&self, process: ProcessId) -> Self {
        let mut next = self.clone();
        *next.counters.entry(process).or_insert(0) += 1;
        next
    }

    /// All processes with a nonzero counter in either clock.
    fn processes_union<'a>(&'a self, other: &'a VectorClock) -> impl Iterator<Item = ProcessId> + 'a {
        let mut keys: Vec<ProcessId> = self
            .counters
            .keys()
            .chain(other.counters.keys())
            .copied()
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys.into_iter()
    }

    /// `true` iff `self <= other` componentwise, with at least one strict
    /// inequality (i.e. `self` strictly happens-before `other`).
    pub fn happens_before(&self, other: &VectorClock) -> bool {
        let mut any_strict = false;
        for p in self.processes_union(other) {
            match self.get(p).cmp(&other.get(p)) {
                Ordering::Greater => return false,
                Ordering::Less => any_strict = true,
                Ordering::Equal => {}
            }
        }
        any_strict
    }

    /// `true` iff neither clock happens-before the other, i.e. the two
    /// events they label are vector-clock incomparable ("concurrent").
    pub fn concurrent_with(&self, other: &VectorClock) -> bool {
        self != other && !self.happens_before(other) && !other.happens_before(self)
    }

    /// Componentwise partial order. `None` means concurrent.
    pub fn partial_compare(&self, other: &VectorClock) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.happens_before(other) {
            Some(Ordering::Less)
        } else if other.happens_before(self) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_advances_only_one_process() {
        let c0 = VectorClock::zero();
        let c1 = c0.incremented(1);
        assert_eq!(c1.get(1), 1);
        assert_eq!(c1.get(2), 0);
    }

    #[test]
    fn causal_chain_happens_before() {
        let a = VectorClock::from_pairs([(1, 1)]);
        let b = VectorClock::from_pairs([(1, 2)]);
        assert!(a.happens_before(&b));
        assert!(!b.happens_before(&a));
    }

    #[test]
    fn divergent_clocks_are_concurrent() {
        let a = VectorClock::from_pairs([(1, 1), (2, 0)]);
        let b = VectorClock::from_pairs([(1, 0), (2, 1)]);
        assert!(a.concurrent_with(&b));
        assert!(b.concurrent_with(&a));
        assert_eq!(a.partial_compare(&b), None);
    }

    #[test]
    fn identical_clocks_are_equal_not_concurrent() {
        let a = VectorClock::from_pairs([(1, 3)]);
        let b = VectorClock::from_pairs([(1, 3)]);
        assert!(!a.concurrent_with(&b));
        assert_eq!(a.partial_compare(&b), Some(Ordering::Equal));
    }
}
