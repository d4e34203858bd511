//! The `Run` configuration surface (spec §6) threaded into every top-level
//! entry point instead of being read from global state (Design Notes,
//! "Global singleton driver").

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::event::EventType;

/// Options recognized by the core driver (spec §6). Constructed by the
/// out-of-scope CLI/parser layer and passed by value into the miner,
/// k-tails, refinement, and coarsening entry points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// `k` used by the k-tails quotient and by the coarsening candidate
    /// filter.
    pub k: u32,
    /// Switches the miner between path-walking (`ChainWalkingMiner`) and
    /// closure-based (`TransitiveClosureMiner`).
    pub use_transitive_closure_mining: bool,
    /// Enables per-relation independent mining over every relation the
    /// trace graph carries, rather than just the default ordering relation.
    pub multiple_relations: bool,
    /// Enables `NeverConcurrent` mining for `DAGs`-shaped trace graphs.
    pub mine_never_concurrent_with: bool,
    /// Invariants whose support is less than or equal to this threshold are
    /// dropped. `0` keeps everything.
    pub support_count_threshold: u64,
    /// Omits `InterruptedBy` from the mined set entirely.
    pub ignore_intr_by: bool,
    /// Drops invariants all of whose operand types lie in this set.
    pub ignore_invs_over_etype_set: BTreeSet<EventType>,
    /// Rescales per-trace event times to `[0, 1]` before mining (affects
    /// only consumers of `Event::time`, not the topology used by the
    /// walker).
    pub trace_normalization: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            k: 1,
            use_transitive_closure_mining: false,
            multiple_relations: false,
            mine_never_concurrent_with: false,
            support_count_threshold: 0,
            ignore_intr_by: false,
            ignore_invs_over_etype_set: BTreeSet::new(),
            trace_normalization: false,
        }
    }
}
