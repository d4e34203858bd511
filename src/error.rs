//! Error taxonomy for the core.
//!
//! Parsing and CLI concerns live outside this crate (spec §1), so the only
//! failures the core itself produces are: malformed input handed to a
//! trace-graph constructor, a violated well-formedness invariant discovered
//! mid-algorithm (programmer error, not user error), and the degenerate case
//! of a refiner stalling on an invariant it cannot make progress on.

use thiserror::Error;

use crate::event::EventType;

/// Every fallible operation exposed by this crate returns this error.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A trace was constructed with zero events.
    #[error("trace graph construction given an empty trace")]
    EmptyTrace,

    /// The `INITIAL` or `TERMINAL` sentinel appeared in the caller-supplied
    /// event sequence instead of being injected by the constructor.
    #[error("sentinel event type used explicitly in trace input: {0:?}")]
    DuplicateSentinel(EventType),

    /// Vector-clock timestamps on a `DAGs`-shaped trace admit a cycle, or
    /// are otherwise inconsistent (e.g. duplicated coordinates within one
    /// process).
    #[error("inconsistent vector clocks while building a DAG trace: {detail}")]
    InconsistentVectorClocks {
        /// Human-readable detail on what was inconsistent.
        detail: String,
    },

    /// A [`crate::relation_path::RelationPath`] well-formedness invariant was
    /// violated: a node had more than one outgoing transition on the
    /// relation being walked, or more than one on the ordering relation.
    #[error("relation-path walker invariant violated at node {node:?}: {detail}")]
    WalkerInvariantViolation {
        /// The offending event node.
        node: crate::trace::EventNodeId,
        /// Human-readable detail.
        detail: String,
    },

    /// A [`crate::partition::Partition`]-graph invariant was violated: an
    /// event node belonging to two partitions, a sentinel split/merged, or
    /// an induced-edge set that disagrees with the underlying trace graph.
    #[error("partition graph invariant violated at partition {partition:?}: {detail}")]
    PartitionInvariantViolation {
        /// The offending partition.
        partition: crate::partition::PartitionId,
        /// Human-readable detail.
        detail: String,
    },

    /// The refinement engine could not find a split that makes progress on
    /// an invariant, which (per spec §7) should be unreachable when the
    /// invariant was mined from the very trace graph being refined.
    #[error("invariant {invariant:?} is unsatisfiable: no split of partition {partition:?} reduces its counterexamples")]
    UnsatisfiableInvariant {
        /// The invariant the refiner stalled on.
        invariant: crate::invariant::Invariant,
        /// The partition on which progress stalled.
        partition: crate::partition::PartitionId,
    },
}

/// Convenience alias used throughout the crate.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
