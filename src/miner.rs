//! Temporal invariant miner (spec §4.4, component D).
//!
//! Two concrete miners behind one [`InvariantMiner`] trait: the primary
//! path-walking [`ChainWalkingMiner`] (built on [`crate::relation_path`])
//! and the alternate [`TransitiveClosureMiner`] (Design Notes: "Unused
//! closure-based miner" — AFby/AP/NFby only, no IntrBy). [`mine_invariants`]
//! is the driver that picks one, applies `multiple_relations` and
//! `mine_never_concurrent_with`, and runs the §6 filtering hooks.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::config::RunConfig;
use crate::error::CoreResult;
use crate::event::EventType;
use crate::invariant::{Invariant, InvariantKind};
use crate::relation_path::RelationPath;
use crate::trace::{EventNodeId, TraceGraph, TraceGraphShape, ORDERING_RELATION};

/// A strategy for deriving temporal invariants from a trace graph restricted
/// to one relation.
pub trait InvariantMiner {
    /// Mines invariants over `relation`, unfiltered (spec §4.4's emit
    /// table, before the §6 driver hooks are applied).
    fn mine(&self, graph: &TraceGraph, relation: &str) -> CoreResult<Vec<Invariant>>;
}

/// The primary miner: one [`RelationPath`] pass per trace, aggregated per
/// spec §4.4.
pub struct ChainWalkingMiner;

impl InvariantMiner for ChainWalkingMiner {
    fn mine(&self, graph: &TraceGraph, relation: &str) -> CoreResult<Vec<Invariant>> {
        let mut event_cnts: BTreeMap<EventType, u64> = BTreeMap::new();
        let mut followed_by: BTreeMap<(EventType, EventType), u64> = BTreeMap::new();
        let mut precedes: BTreeMap<(EventType, EventType), u64> = BTreeMap::new();
        // Keyed by the recurring type `a`; value is the shrinking candidate
        // set of interrupters `b`, or `None` until `a`'s first recurrence.
        let mut possible_interrupts: BTreeMap<EventType, BTreeSet<EventType>> = BTreeMap::new();
        let mut always_follows_initial: Option<BTreeSet<EventType>> = None;
        let mut all_types: BTreeSet<EventType> = BTreeSet::new();

        for trace_index in 0..graph.trace_count() {
            let path = RelationPath::new(graph, trace_index, relation, ORDERING_RELATION);
            let stats = path.stats()?;

            for (t, &c) in &stats.event_counts {
                *event_cnts.entry(t.clone()).or_insert(0) += c;
                all_types.insert(t.clone());
            }
            for (&(ref a, ref b), &c) in &stats.followed_by_counts {
                *followed_by.entry((a.clone(), b.clone())).or_insert(0) += c;
            }
            for (&(ref a, ref b), &c) in &stats.precedes_counts {
                *precedes.entry((a.clone(), b.clone())).or_insert(0) += c;
            }
            for (a, candidates) in &stats.possible_interrupts {
                possible_interrupts
                    .entry(a.clone())
                    .and_modify(|existing| *existing = existing.intersection(candidates).cloned().collect())
                    .or_insert_with(|| candidates.clone());
            }
            always_follows_initial = Some(match always_follows_initial {
                None => stats.seen.clone(),
                Some(prev) => prev.intersection(&stats.seen).cloned().collect(),
            });
        }

        let mut invariants = Vec::new();

        for a in &all_types {
            for b in &all_types {
                if a == b {
                    continue;
                }
                let ea = *event_cnts.get(a).unwrap_or(&0);
                let eb = *event_cnts.get(b).unwrap_or(&0);
                let fb = *followed_by.get(&(a.clone(), b.clone())).unwrap_or(&0);
                let pc = *precedes.get(&(a.clone(), b.clone())).unwrap_or(&0);

                if ea > 0 && fb == ea {
                    invariants.push(Invariant::new(a.clone(), b.clone(), InvariantKind::AlwaysFollowedBy).with_support(ea));
                }
                if fb == 0 && ea > 0 && eb > 0 {
                    invariants.push(Invariant::new(a.clone(), b.clone(), InvariantKind::NeverFollowedBy).with_support(ea));
                }
                if eb > 0 && pc == eb {
                    invariants.push(Invariant::new(a.clone(), b.clone(), InvariantKind::AlwaysPrecedes).with_support(eb));
                }
            }
        }

        for (a, candidates) in &possible_interrupts {
            for b in candidates {
                invariants.push(
                    Invariant::new(a.clone(), b.clone(), InvariantKind::InterruptedBy)
                        .with_support(*event_cnts.get(a).unwrap_or(&0)),
                );
            }
        }

        if let Some(set) = always_follows_initial {
            for t in set {
                invariants
                    .push(Invariant::new(EventType::INITIAL, t, InvariantKind::AlwaysFollowedBy).with_support(graph.trace_count() as u64));
            }
        }

        Ok(invariants)
    }
}

/// The alternate miner (Design Notes): AFby/AP/NFby by closing the trace
/// graph's reachability relation rather than walking a single relation
/// path. Does not derive IntrBy, and does not emit `AFby(INITIAL, t)` —
/// only `ChainWalkingMiner` threads that bookkeeping through.
pub struct TransitiveClosureMiner;

impl TransitiveClosureMiner {
    fn reachable_from(graph: &TraceGraph, relation: &str, start: EventNodeId) -> BTreeSet<EventNodeId> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        visited.insert(start);
        while let Some(cur) = queue.pop_front() {
            let r = graph.outgoing_on(cur, relation);
            let next: Vec<EventNodeId> = if r.is_empty() { graph.outgoing_on(cur, ORDERING_RELATION) } else { r };
            for n in next {
                if visited.insert(n) {
                    queue.push_back(n);
                }
            }
        }
        visited
    }
}

impl InvariantMiner for TransitiveClosureMiner {
    fn mine(&self, graph: &TraceGraph, relation: &str) -> CoreResult<Vec<Invariant>> {
        let mut event_cnts: BTreeMap<EventType, u64> = BTreeMap::new();
        let mut afby_fails: BTreeSet<(EventType, EventType)> = BTreeSet::new();
        let mut ap_fails: BTreeSet<(EventType, EventType)> = BTreeSet::new();
        let mut any_reaches: BTreeSet<(EventType, EventType)> = BTreeSet::new();
        let mut all_types: BTreeSet<EventType> = BTreeSet::new();

        for trace in graph.traces() {
            for &n in &trace.nodes {
                all_types.insert(graph.event_type(n).clone());
            }
        }

        for trace in graph.traces() {
            for &u in &trace.nodes {
                let ta = graph.event_type(u).clone();
                *event_cnts.entry(ta.clone()).or_insert(0) += 1;
                let reach = Self::reachable_from(graph, relation, u);
                let reached_types: BTreeSet<EventType> = reach.iter().map(|&n| graph.event_type(n).clone()).collect();

                for b in &all_types {
                    if b == &ta {
                        continue;
                    }
                    if reached_types.contains(b) {
                        any_reaches.insert((ta.clone(), b.clone()));
                    } else {
                        afby_fails.insert((ta.clone(), b.clone()));
                    }
                }
            }
            // AP: for each node v, does *some* a-typed node in this trace
            // reach it? Equivalent to asking, for each a, whether every
            // b-node was reached by an a-node somewhere above; track the
            // complement directly.
            for &v in &trace.nodes {
                let tb = graph.event_type(v).clone();
                for a in &all_types {
                    if a == &tb {
                        continue;
                    }
                    let reached_by_some_a = trace
                        .nodes
                        .iter()
                        .filter(|&&u| graph.event_type(u) == a)
                        .any(|&u| Self::reachable_from(graph, relation, u).contains(&v));
                    if !reached_by_some_a {
                        ap_fails.insert((a.clone(), tb.clone()));
                    }
                }
            }
        }

        let mut invariants = Vec::new();
        for a in &all_types {
            for b in &all_types {
                if a == b {
                    continue;
                }
                let ea = *event_cnts.get(a).unwrap_or(&0);
                let eb = *event_cnts.get(b).unwrap_or(&0);
                let key = (a.clone(), b.clone());
                if ea > 0 && !afby_fails.contains(&key) {
                    invariants.push(Invariant::new(a.clone(), b.clone(), InvariantKind::AlwaysFollowedBy).with_support(ea));
                }
                if ea > 0 && eb > 0 && !any_reaches.contains(&key) {
                    invariants.push(Invariant::new(a.clone(), b.clone(), InvariantKind::NeverFollowedBy).with_support(ea));
                }
                if eb > 0 && !ap_fails.contains(&key) {
                    invariants.push(Invariant::new(a.clone(), b.clone(), InvariantKind::AlwaysPrecedes).with_support(eb));
                }
            }
        }
        Ok(invariants)
    }
}

/// Emits `NeverConcurrent(a, b)` for every distinct type pair never
/// witnessed as vector-clock-incomparable in any trace (spec §4.4
/// partial-order variant). Only meaningful for `DAGs`-shaped graphs.
fn mine_never_concurrent(graph: &TraceGraph) -> Vec<Invariant> {
    let mut all_types: BTreeSet<EventType> = BTreeSet::new();
    for trace in graph.traces() {
        for &n in &trace.nodes {
            all_types.insert(graph.event_type(n).clone());
        }
    }

    let mut ever_concurrent: BTreeSet<(EventType, EventType)> = BTreeSet::new();
    for trace in graph.traces() {
        let forward: BTreeMap<EventNodeId, BTreeSet<EventNodeId>> = trace
            .nodes
            .iter()
            .map(|&n| (n, TransitiveClosureMiner::reachable_from(graph, ORDERING_RELATION, n)))
            .collect();

        for &u in &trace.nodes {
            for &v in &trace.nodes {
                if u == v {
                    continue;
                }
                let concurrent = !forward[&u].contains(&v) && !forward[&v].contains(&u);
                if concurrent {
                    let ta = graph.event_type(u).clone();
                    let tb = graph.event_type(v).clone();
                    let (lo, hi) = if ta <= tb { (ta, tb) } else { (tb, ta) };
                    ever_concurrent.insert((lo, hi));
                }
            }
        }
    }

    let mut invariants = Vec::new();
    let types: Vec<&EventType> = all_types.iter().collect();
    for (i, &a) in types.iter().enumerate() {
        for &b in &types[i + 1..] {
            if !ever_concurrent.contains(&(a.clone(), b.clone())) {
                invariants.push(Invariant::new(a.clone(), b.clone(), InvariantKind::NeverConcurrent));
            }
        }
    }
    invariants
}

/// Driver that selects a miner, mines (optionally over every relation the
/// graph carries), adds `NeverConcurrent` when requested, and applies the
/// §6 filtering hooks (support threshold, `ignoreIntrBy`,
/// `ignoreInvsOverETypeSet`).
pub fn mine_invariants(graph: &TraceGraph, relation: &str, config: &RunConfig) -> CoreResult<Vec<Invariant>> {
    let mut relations_to_mine = vec![relation.to_string()];
    if config.multiple_relations {
        let all: Vec<String> = graph.relations().into_iter().collect();
        if !all.is_empty() {
            relations_to_mine = all;
        }
    }

    let mut mined = Vec::new();
    for r in &relations_to_mine {
        let batch = if config.use_transitive_closure_mining {
            TransitiveClosureMiner.mine(graph, r)?
        } else {
            ChainWalkingMiner.mine(graph, r)?
        };
        mined.extend(batch);
    }

    if config.mine_never_concurrent_with && graph.shape() == TraceGraphShape::Dags {
        mined.extend(mine_never_concurrent(graph));
    }

    if config.ignore_intr_by {
        mined.retain(|inv| inv.kind != InvariantKind::InterruptedBy);
    }
    mined.retain(|inv| inv.support.map_or(true, |s| s > config.support_count_threshold));
    if !config.ignore_invs_over_etype_set.is_empty() {
        mined.retain(|inv| {
            !(config.ignore_invs_over_etype_set.contains(&inv.left) && config.ignore_invs_over_etype_set.contains(&inv.right))
        });
    }

    let mut deduped: Vec<Invariant> = Vec::new();
    for inv in mined {
        if !deduped.contains(&inv) {
            deduped.push(inv);
        }
    }
    Ok(deduped)
}
