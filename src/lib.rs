//! Infers a finite-state model of a component's behavior from event logs.
//!
//! Given a multiset of totally- or partially-ordered event traces, this
//! crate mines temporal invariants over event types ([`miner`]), builds an
//! initial partition graph ([`partition`]), then alternately refines
//! ([`refine`]) and coarsens ([`coarsen`]) it until the graph accepts every
//! observed trace and satisfies every mined invariant. It separately
//! computes a generalized k-tails quotient ([`ktails::perform_k_tails`]) on
//! event nodes.
//!
//! Log tokenization, CLI argument parsing, and graph export formats
//! (DOT/GML/JSON/LTS) are out of scope — this crate consumes already-parsed
//! [`event::Event`] sequences and exposes the final [`partition::PartitionGraph`]
//! as a read-only iterable for an external collaborator to serialize.

pub mod coarsen;
pub mod config;
pub mod error;
pub mod event;
pub mod invariant;
pub mod ktails;
pub mod miner;
pub mod partition;
pub mod refine;
pub mod relation_path;
pub mod time;
pub mod trace;
pub mod vector_clock;

pub use config::RunConfig;
pub use error::{CoreError, CoreResult};
pub use event::{Event, EventType};
pub use invariant::{Invariant, InvariantKind};
pub use ktails::perform_k_tails;
pub use partition::PartitionGraph;
pub use trace::{TraceGraph, TraceGraphShape};

/// Runs the full pipeline: mine invariants, seed the initial partition
/// graph from the trace graph's event-type clusters, refine away
/// counterexamples, then coarsen with k-tails guidance — spec §2's full
/// data flow, `parsed events → trace graph → {miner, k-tails} → partition
/// graph → refine → coarsen → final partition graph`.
///
/// Returns the final partition graph alongside the invariant set it was
/// built to satisfy, since both are typically needed by a caller exporting
/// results (spec §6).
#[tracing::instrument(skip_all)]
pub fn run<'g>(trace_graph: &'g TraceGraph, relation: &str, config: &RunConfig) -> CoreResult<(PartitionGraph<'g>, Vec<Invariant>)> {
    let invariants = miner::mine_invariants(trace_graph, relation, config)?;
    tracing::debug!(count = invariants.len(), "mined invariants");

    let mut pg = PartitionGraph::initialize_from(trace_graph, &invariants)?;
    tracing::debug!(partitions = pg.get_nodes().len(), "initial partition graph");

    refine::refine(&mut pg, &invariants, None)?;
    tracing::debug!(partitions = pg.get_nodes().len(), "refined partition graph");

    coarsen::coarsen(&mut pg, &invariants, config.k)?;
    tracing::debug!(partitions = pg.get_nodes().len(), "coarsened partition graph");

    Ok((pg, invariants))
}
