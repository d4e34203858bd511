//! Invariant-preserving coarsening engine (spec §4.8, component H).
//!
//! Greedily merges k-equivalent, same-typed partition pairs as long as
//! every supplied invariant still holds afterward, using a `VecDeque`
//! worklist seeded and extended in ascending `(PartitionId, PartitionId)`
//! order (spec §5's determinism requirement).

use std::collections::{BTreeSet, VecDeque};

use crate::error::CoreResult;
use crate::event::EventType;
use crate::invariant::Invariant;
use crate::ktails::KTailsSession;
use crate::partition::{Operation, PartitionGraph, PartitionId};

/// Runs greedy pairwise coarsening to a fixed point: no k-equivalent,
/// same-typed pair remains whose merge would preserve every invariant in
/// `invariants`.
///
/// A fresh [`KTailsSession`] backs every individual equivalence check
/// rather than one session spanning the whole run: a session's memo table
/// is only valid for a fixed graph, and coarsening mutates the graph (and
/// petgraph's `StableDiGraph` can hand a removed node's freed slot to a
/// brand-new one) between every accepted merge.
pub fn coarsen(pg: &mut PartitionGraph<'_>, invariants: &[Invariant], k: u32) -> CoreResult<()> {
    let mut types: BTreeSet<EventType> = BTreeSet::new();
    for (_, ty, is_initial, is_terminal) in pg.iter_nodes() {
        if !is_initial && !is_terminal {
            types.insert(ty);
        }
    }

    let mut seed: Vec<(PartitionId, PartitionId)> = Vec::new();
    for ty in &types {
        let ids = pg.partitions_of_type(ty);
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                if k_equivalent(pg, ids[i], ids[j], k) {
                    seed.push((ids[i], ids[j]));
                }
            }
        }
    }
    seed.sort();
    let mut worklist: VecDeque<(PartitionId, PartitionId)> = seed.into();

    while let Some((a, b)) = worklist.pop_front() {
        if a == b {
            continue;
        }
        let (Some(pa), Some(pb)) = (pg.partition(a), pg.partition(b)) else {
            continue; // one side was consumed by an earlier merge this run.
        };
        if pa.is_initial() || pa.is_terminal() || pb.is_initial() || pb.is_terminal() {
            continue;
        }
        if pa.event_type() != pb.event_type() {
            continue;
        }

        let inverse = pg.apply(Operation::Merge {
            partitions: vec![a, b],
        })?;
        let merged_id = match &inverse {
            Operation::MultiSplit { partition, .. } => *partition,
            Operation::Merge { .. } => unreachable!("a merge's inverse is always a MultiSplit"),
        };

        let breaks_an_invariant = invariants.iter().any(|inv| pg.get_counterexample(inv).is_some());
        if breaks_an_invariant {
            pg.apply(inverse)?;
            continue;
        }

        let ty = pg.partition(merged_id).expect("just merged").event_type().clone();
        let mut new_candidates: Vec<(PartitionId, PartitionId)> = Vec::new();
        for other in pg.partitions_of_type(&ty) {
            if other == merged_id {
                continue;
            }
            let pair = if merged_id < other { (merged_id, other) } else { (other, merged_id) };
            if k_equivalent(pg, pair.0, pair.1, k) {
                new_candidates.push(pair);
            }
        }
        new_candidates.sort();
        worklist.extend(new_candidates);
    }

    Ok(())
}

fn k_equivalent(pg: &PartitionGraph<'_>, a: PartitionId, b: PartitionId, k: u32) -> bool {
    KTailsSession::new().k_equals_within(pg, a, b, k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::trace::TraceGraph;

    fn ev(label: &str) -> Event {
        Event::new(EventType::Label(label.to_string()))
    }

    #[test]
    fn fully_split_twin_chains_recollapse_at_k1() {
        let g = TraceGraph::from_chains(vec![
            vec![ev("a"), ev("b"), ev("c")],
            vec![ev("a"), ev("b"), ev("c")],
        ])
        .unwrap();
        let singleton_groups: Vec<Vec<crate::trace::EventNodeId>> = g.all_event_nodes().into_iter().map(|n| vec![n]).collect();
        let mut pg = PartitionGraph::from_groups(
            &g,
            std::iter::once(vec![g.initial()])
                .chain(singleton_groups)
                .chain(std::iter::once(vec![g.terminal()]))
                .collect(),
        )
        .unwrap();
        let before = pg.get_nodes().len();
        assert_eq!(before, 8); // INITIAL + 2*(a,b,c) + TERMINAL

        coarsen(&mut pg, &[], 1).unwrap();
        assert_eq!(pg.get_nodes().len(), 5);
    }

    #[test]
    fn never_merges_across_event_types() {
        let g = TraceGraph::from_chains(vec![vec![ev("a"), ev("b")]]).unwrap();
        let mut pg = PartitionGraph::initialize_from(&g, &[]).unwrap();
        let before = pg.get_nodes().len();
        coarsen(&mut pg, &[], 5).unwrap();
        assert_eq!(pg.get_nodes().len(), before);
    }

    #[test]
    fn permanently_violated_invariant_blocks_every_merge() {
        // AFby(a, <type that never occurs>) can never be satisfied: nothing
        // is ever forbidden in the counterexample search, so a path to
        // TERMINAL always exists. Every merge attempt must therefore be
        // reverted, and the fully split graph is left untouched.
        use crate::invariant::InvariantKind;

        let g = TraceGraph::from_chains(vec![
            vec![ev("a"), ev("b"), ev("c")],
            vec![ev("a"), ev("b"), ev("c")],
        ])
        .unwrap();
        let singleton_groups: Vec<Vec<crate::trace::EventNodeId>> = g.all_event_nodes().into_iter().map(|n| vec![n]).collect();
        let mut pg = PartitionGraph::from_groups(
            &g,
            std::iter::once(vec![g.initial()])
                .chain(singleton_groups)
                .chain(std::iter::once(vec![g.terminal()]))
                .collect(),
        )
        .unwrap();
        let before = pg.get_nodes().len();

        let impossible = Invariant::new(EventType::Label("a".into()), EventType::Label("ghost".into()), InvariantKind::AlwaysFollowedBy);
        coarsen(&mut pg, std::slice::from_ref(&impossible), 1).unwrap();
        assert_eq!(pg.get_nodes().len(), before);
    }
}
