//! Partition graph, the quotient over event nodes (spec §4.5), and the
//! reversible [`Operation`] protocol that mutates it (spec §4.6).
//!
//! Backed by `petgraph::stable_graph::StableDiGraph<Partition, InducedEdge>`
//! so that a partition's identity is the stable `NodeIndex` petgraph hands
//! out: removing a node during a split/merge never reassigns surviving
//! indices, which is exactly the stability the `Operation` protocol depends
//! on (Design Notes, "Cyclic graphs").

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{CoreError, CoreResult};
use crate::event::EventType;
use crate::invariant::{Invariant, InvariantKind};
use crate::ktails::Behavioral;
use crate::trace::{EventNodeId, TraceGraph};

/// Stable identifier for a partition within one [`PartitionGraph`].
pub type PartitionId = petgraph::graph::NodeIndex<u32>;

/// Per-relation counts backing one induced edge: how many underlying
/// event-node transitions, tagged with that relation, connect the source
/// partition's nodes to the destination partition's nodes. Doubles as the
/// "optional frequency" field of spec §6's edge export tuple.
pub type InducedEdge = BTreeMap<String, u64>;

/// A non-empty set of event nodes of identical event type (spec §3, §4.5).
#[derive(Debug, Clone)]
pub struct Partition {
    event_type: EventType,
    nodes: BTreeSet<EventNodeId>,
    is_initial: bool,
    is_terminal: bool,
}

impl Partition {
    /// The event type shared by every node in this partition.
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// The event nodes this partition owns.
    pub fn nodes(&self) -> &BTreeSet<EventNodeId> {
        &self.nodes
    }

    /// Whether this is the singleton `INITIAL` partition.
    pub fn is_initial(&self) -> bool {
        self.is_initial
    }

    /// Whether this is the singleton `TERMINAL` partition.
    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }

    fn is_sentinel(&self) -> bool {
        self.is_initial || self.is_terminal
    }
}

/// A sequence of partitions witnessing a violation of a specific invariant
/// (spec §4.5 `getCounterexample`, §8 "Counterexample").
#[derive(Debug, Clone)]
pub struct Counterexample {
    /// The partition path, in traversal order, witnessing the violation.
    pub path: Vec<PartitionId>,
    /// The invariant this path violates.
    pub invariant: Invariant,
}

/// A reversible mutation of a [`PartitionGraph`] (spec §4.6).
#[derive(Debug, Clone)]
pub enum Operation {
    /// Splits `partition`'s event-node set into `groups.len() >= 2`
    /// non-empty, disjoint groups, replacing it with one new partition per
    /// group.
    MultiSplit {
        /// The partition to split.
        partition: PartitionId,
        /// Its replacement groups; must exactly partition the original
        /// node set.
        groups: Vec<BTreeSet<EventNodeId>>,
    },
    /// Merges `partitions.len() >= 2` partitions of identical, non-sentinel
    /// event type into one.
    Merge {
        /// The partitions to merge.
        partitions: Vec<PartitionId>,
    },
}

/// Quotient graph whose nodes are partitions of event nodes (spec §4.5).
pub struct PartitionGraph<'g> {
    graph: StableDiGraph<Partition, InducedEdge>,
    trace_graph: &'g TraceGraph,
    owner: BTreeMap<EventNodeId, PartitionId>,
    initial: PartitionId,
    terminal: PartitionId,
}

impl<'g> PartitionGraph<'g> {
    /// Creates one partition per event-type cluster of `trace_graph`, plus
    /// the two sentinel singletons (spec §4.5 `initializeFrom`).
    ///
    /// `_mined_invariants` is accepted to match the spec's documented
    /// signature; the initial clustering is always by event type,
    /// independent of which invariants were mined, so it is not otherwise
    /// consulted here — invariants only start mattering once the
    /// refinement/coarsening drivers run.
    pub fn initialize_from(trace_graph: &'g TraceGraph, _mined_invariants: &[Invariant]) -> CoreResult<Self> {
        let groups: Vec<Vec<EventNodeId>> = trace_graph.nodes_by_type().into_values().collect();
        Self::from_groups(trace_graph, groups)
    }

    /// Builds a partition graph directly from a list of node groupings, each
    /// of which must be non-empty and of uniform event type. Used both by
    /// [`Self::initialize_from`] and by `performKTails` (equivalence
    /// classes in place of per-type clusters).
    pub fn from_groups(trace_graph: &'g TraceGraph, groups: Vec<Vec<EventNodeId>>) -> CoreResult<Self> {
        let mut graph = StableDiGraph::new();
        let mut owner = BTreeMap::new();
        let mut initial = None;
        let mut terminal = None;

        for group in groups {
            let Some(&first) = group.first() else { continue };
            let event_type = trace_graph.event_type(first).clone();
            let mut nodes = BTreeSet::new();
            for &n in &group {
                if trace_graph.event_type(n) != &event_type {
                    return Err(CoreError::PartitionInvariantViolation {
                        partition: petgraph::graph::NodeIndex::end(),
                        detail: "initial grouping mixes event types within one partition".into(),
                    });
                }
                nodes.insert(n);
            }
            let is_initial = event_type == EventType::INITIAL;
            let is_terminal = event_type == EventType::TERMINAL;
            let id = graph.add_node(Partition {
                event_type,
                nodes: nodes.clone(),
                is_initial,
                is_terminal,
            });
            for n in nodes {
                owner.insert(n, id);
            }
            if is_initial {
                initial = Some(id);
            }
            if is_terminal {
                terminal = Some(id);
            }
        }

        let initial = initial.ok_or_else(|| CoreError::PartitionInvariantViolation {
            partition: petgraph::graph::NodeIndex::end(),
            detail: "no INITIAL partition produced by grouping".into(),
        })?;
        let terminal = terminal.ok_or_else(|| CoreError::PartitionInvariantViolation {
            partition: petgraph::graph::NodeIndex::end(),
            detail: "no TERMINAL partition produced by grouping".into(),
        })?;

        let mut pg = PartitionGraph {
            graph,
            trace_graph,
            owner,
            initial,
            terminal,
        };
        pg.rebuild_induced_edges();
        Ok(pg)
    }

    /// Recomputes every induced edge from scratch via the owner map and the
    /// underlying trace graph. Simpler than incremental edge patching and,
    /// at this crate's scale (one run's worth of event nodes), no less
    /// practical; called after every split/merge.
    fn rebuild_induced_edges(&mut self) {
        self.graph.clear_edges();
        let mut counts: BTreeMap<(PartitionId, PartitionId), InducedEdge> = BTreeMap::new();
        for (&node, &owner_id) in &self.owner {
            for (target, relations) in self.trace_graph.outgoing(node) {
                let target_owner = self.owner[&target];
                let entry = counts.entry((owner_id, target_owner)).or_default();
                for relation in relations {
                    *entry.entry(relation.clone()).or_insert(0) += 1;
                }
            }
        }
        for ((src, dst), edge) in counts {
            self.graph.add_edge(src, dst, edge);
        }
    }

    /// The trace graph this partition graph quotients.
    pub fn trace_graph(&self) -> &TraceGraph {
        self.trace_graph
    }

    /// All partition ids, in ascending stable order.
    pub fn get_nodes(&self) -> Vec<PartitionId> {
        let mut ids: Vec<PartitionId> = self.graph.node_indices().collect();
        ids.sort();
        ids
    }

    /// The singleton `INITIAL` partition.
    pub fn initial(&self) -> PartitionId {
        self.initial
    }

    /// The singleton `TERMINAL` partition.
    pub fn terminal(&self) -> PartitionId {
        self.terminal
    }

    /// Every relation tag appearing on any induced edge, sorted.
    pub fn get_relations(&self) -> BTreeSet<String> {
        let mut all = BTreeSet::new();
        for edge in self.graph.edge_weights() {
            all.extend(edge.keys().cloned());
        }
        all
    }

    /// The partition owning `node`.
    pub fn owner_of(&self, node: EventNodeId) -> PartitionId {
        self.owner[&node]
    }

    /// Immutable view of one partition.
    pub fn partition(&self, id: PartitionId) -> Option<&Partition> {
        self.graph.node_weight(id)
    }

    /// All partitions of a given event type, in ascending id order.
    pub fn partitions_of_type(&self, ty: &EventType) -> Vec<PartitionId> {
        let mut ids: Vec<PartitionId> = self
            .graph
            .node_indices()
            .filter(|&id| &self.graph[id].event_type == ty)
            .collect();
        ids.sort();
        ids
    }

    /// Read-only export tuples for nodes (spec §6 graph export).
    pub fn iter_nodes(&self) -> impl Iterator<Item = (PartitionId, EventType, bool, bool)> + '_ {
        self.get_nodes().into_iter().map(move |id| {
            let p = &self.graph[id];
            (id, p.event_type.clone(), p.is_initial, p.is_terminal)
        })
    }

    /// Read-only export tuples for edges (spec §6 graph export):
    /// `(src, dst, relationTag, frequency)`.
    pub fn iter_edges(&self) -> Vec<(PartitionId, PartitionId, String, u64)> {
        let mut out = Vec::new();
        let mut edge_ids: Vec<_> = self.graph.edge_indices().collect();
        edge_ids.sort_by_key(|&e| {
            let (a, b) = self.graph.edge_endpoints(e).expect("edge index from this graph");
            (a, b)
        });
        for e in edge_ids {
            let (src, dst) = self.graph.edge_endpoints(e).expect("edge index from this graph");
            for (relation, freq) in &self.graph[e] {
                out.push((src, dst, relation.clone(), *freq));
            }
        }
        out
    }

    fn validate_multi_split(&self, partition: PartitionId, groups: &[BTreeSet<EventNodeId>]) -> CoreResult<()> {
        let p = self.graph.node_weight(partition).ok_or_else(|| CoreError::PartitionInvariantViolation {
            partition,
            detail: "split requested on a partition that does not exist".into(),
        })?;
        if p.is_sentinel() {
            return Err(CoreError::PartitionInvariantViolation {
                partition,
                detail: "INITIAL/TERMINAL may never be split".into(),
            });
        }
        if groups.len() < 2 {
            return Err(CoreError::PartitionInvariantViolation {
                partition,
                detail: "a split must produce at least two groups".into(),
            });
        }
        let mut seen = BTreeSet::new();
        for group in groups {
            if group.is_empty() {
                return Err(CoreError::PartitionInvariantViolation {
                    partition,
                    detail: "split group must be non-empty".into(),
                });
            }
            for &n in group {
                if !p.nodes.contains(&n) {
                    return Err(CoreError::PartitionInvariantViolation {
                        partition,
                        detail: "split group contains a node outside the partition".into(),
                    });
                }
                if !seen.insert(n) {
                    return Err(CoreError::PartitionInvariantViolation {
                        partition,
                        detail: "split groups overlap".into(),
                    });
                }
            }
        }
        if seen.len() != p.nodes.len() {
            return Err(CoreError::PartitionInvariantViolation {
                partition,
                detail: "split groups do not cover every node of the partition".into(),
            });
        }
        Ok(())
    }

    fn apply_multi_split(&mut self, partition: PartitionId, groups: Vec<BTreeSet<EventNodeId>>) -> CoreResult<Operation> {
        self.validate_multi_split(partition, &groups)?;
        let event_type = self.graph[partition].event_type.clone();

        self.graph.remove_node(partition);
        let mut new_ids = Vec::with_capacity(groups.len());
        for group in groups {
            let id = self.graph.add_node(Partition {
                event_type: event_type.clone(),
                nodes: group.clone(),
                is_initial: false,
                is_terminal: false,
            });
            for n in group {
                self.owner.insert(n, id);
            }
            new_ids.push(id);
        }
        self.rebuild_induced_edges();
        Ok(Operation::Merge { partitions: new_ids })
    }

    fn validate_merge(&self, partitions: &[PartitionId]) -> CoreResult<()> {
        if partitions.len() < 2 {
            return Err(CoreError::PartitionInvariantViolation {
                partition: partitions.first().copied().unwrap_or_else(petgraph::graph::NodeIndex::end),
                detail: "a merge must combine at least two partitions".into(),
            });
        }
        let mut seen = BTreeSet::new();
        let mut ty: Option<&EventType> = None;
        for &pid in partitions {
            let p = self.graph.node_weight(pid).ok_or(CoreError::PartitionInvariantViolation {
                partition: pid,
                detail: "merge requested on a partition that does not exist".into(),
            })?;
            if p.is_sentinel() {
                return Err(CoreError::PartitionInvariantViolation {
                    partition: pid,
                    detail: "INITIAL/TERMINAL may never be merged".into(),
                });
            }
            if let Some(t) = ty {
                if t != &p.event_type {
                    return Err(CoreError::PartitionInvariantViolation {
                        partition: pid,
                        detail: "merge requires identical event types".into(),
                    });
                }
            } else {
                ty = Some(&p.event_type);
            }
            if !seen.insert(pid) {
                return Err(CoreError::PartitionInvariantViolation {
                    partition: pid,
                    detail: "merge list repeats a partition".into(),
                });
            }
        }
        Ok(())
    }

    fn apply_merge(&mut self, partitions: Vec<PartitionId>) -> CoreResult<Operation> {
        self.validate_merge(&partitions)?;
        let event_type = self.graph[partitions[0]].event_type.clone();
        let mut groups_for_inverse = Vec::with_capacity(partitions.len());
        let mut union_nodes = BTreeSet::new();
        for &pid in &partitions {
            let nodes = self.graph[pid].nodes.clone();
            union_nodes.extend(nodes.iter().copied());
            groups_for_inverse.push(nodes);
        }
        for &pid in &partitions {
            self.graph.remove_node(pid);
        }
        let new_id = self.graph.add_node(Partition {
            event_type,
            nodes: union_nodes.clone(),
            is_initial: false,
            is_terminal: false,
        });
        for n in union_nodes {
            self.owner.insert(n, new_id);
        }
        self.rebuild_induced_edges();
        Ok(Operation::MultiSplit {
            partition: new_id,
            groups: groups_for_inverse,
        })
    }

    /// Applies `op`, returning its inverse (spec §4.6). On failure the
    /// graph is left exactly as it was: every operation validates fully
    /// before mutating anything.
    pub fn apply(&mut self, op: Operation) -> CoreResult<Operation> {
        match op {
            Operation::MultiSplit { partition, groups } => self.apply_multi_split(partition, groups),
            Operation::Merge { partitions } => self.apply_merge(partitions),
        }
    }

    /// BFS from `start` over induced edges, returning the first path that
    /// reaches a partition satisfying `is_target`, without ever stepping
    /// *through* (continuing past) a partition satisfying `is_forbidden`.
    /// Reaching a forbidden partition itself is not a match; it's a dead
    /// end for that branch.
    fn find_path(&self, start: PartitionId, is_target: impl Fn(&Partition) -> bool, is_forbidden: impl Fn(&Partition) -> bool) -> Option<Vec<PartitionId>> {
        let mut visited = BTreeSet::new();
        let mut pred: BTreeMap<PartitionId, PartitionId> = BTreeMap::new();
        let mut queue = VecDeque::new();
        visited.insert(start);
        queue.push_back(start);

        while let Some(cur) = queue.pop_front() {
            let mut neighbors: Vec<PartitionId> = self.graph.edges_directed(cur, Direction::Outgoing).map(|e| e.target()).collect();
            neighbors.sort();
            neighbors.dedup();
            for nb in neighbors {
                let p = &self.graph[nb];
                if is_target(p) {
                    let mut path = Self::backtrack(&pred, start, cur);
                    path.push(nb);
                    return Some(path);
                }
                if is_forbidden(p) {
                    continue;
                }
                if visited.insert(nb) {
                    pred.insert(nb, cur);
                    queue.push_back(nb);
                }
            }
        }
        None
    }

    fn backtrack(pred: &BTreeMap<PartitionId, PartitionId>, start: PartitionId, node: PartitionId) -> Vec<PartitionId> {
        let mut path = vec![node];
        let mut cur = node;
        while cur != start {
            cur = pred[&cur];
            path.push(cur);
        }
        path.reverse();
        path
    }

    /// Returns a counterexample witnessing `invariant`'s violation on the
    /// current partition graph, or `None` if it already holds (spec §4.5).
    pub fn get_counterexample(&self, invariant: &Invariant) -> Option<Counterexample> {
        let path = match invariant.kind {
            InvariantKind::AlwaysFollowedBy => self.partitions_of_type(&invariant.left).into_iter().find_map(|start| {
                self.find_path(start, |p| p.is_terminal, |p| p.event_type == invariant.right)
            }),
            InvariantKind::NeverFollowedBy => self.partitions_of_type(&invariant.left).into_iter().find_map(|start| {
                self.find_path(start, |p| p.event_type == invariant.right, |_| false)
            }),
            InvariantKind::AlwaysPrecedes => {
                self.find_path(self.initial, |p| p.event_type == invariant.right, |p| p.event_type == invariant.left)
            }
            InvariantKind::InterruptedBy => self.partitions_of_type(&invariant.left).into_iter().find_map(|start| {
                self.find_path(start, |p| p.event_type == invariant.left, |p| p.event_type == invariant.right)
            }),
            // NeverConcurrent is a fact about vector-clock incomparability
            // within the original trace graph, not about partition-graph
            // reachability; it is never used to drive refine/coarsen.
            InvariantKind::NeverConcurrent => None,
        };
        path.map(|path| Counterexample {
            path,
            invariant: invariant.clone(),
        })
    }
}

impl Behavioral for PartitionGraph<'_> {
    type Node = PartitionId;

    fn node_type(&self, node: PartitionId) -> EventType {
        self.graph[node].event_type.clone()
    }

    fn successors(&self, node: PartitionId) -> Vec<PartitionId> {
        let mut out: Vec<PartitionId> = self.graph.edges_directed(node, Direction::Outgoing).map(|e| e.target()).collect();
        out.sort();
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    fn ev(label: &str) -> Event {
        Event::new(EventType::Label(label.to_string()))
    }

    #[test]
    fn s1_k1_collapse_has_five_partitions() {
        let g = TraceGraph::from_chains(vec![vec![ev("a"), ev("b"), ev("c")]]).unwrap();
        let pg = PartitionGraph::initialize_from(&g, &[]).unwrap();
        assert_eq!(pg.get_nodes().len(), 5);
    }

    #[test]
    fn induced_edges_cover_every_underlying_transition() {
        let g = TraceGraph::from_chains(vec![vec![ev("open"), ev("read"), ev("close")]]).unwrap();
        let pg = PartitionGraph::initialize_from(&g, &[]).unwrap();
        let open = pg.partitions_of_type(&EventType::Label("open".into()))[0];
        let read = pg.partitions_of_type(&EventType::Label("read".into()))[0];
        assert!(pg.successors(open).contains(&read));
    }

    #[test]
    fn split_then_merge_round_trips() {
        let g = TraceGraph::from_chains(vec![vec![ev("a"), ev("b")], vec![ev("a"), ev("c")]]).unwrap();
        let mut pg = PartitionGraph::initialize_from(&g, &[]).unwrap();
        let before = pg.get_nodes().len();

        let a_part = pg.partitions_of_type(&EventType::Label("a".into()))[0];
        let a_nodes: Vec<EventNodeId> = pg.partition(a_part).unwrap().nodes().iter().copied().collect();
        let groups = vec![
            BTreeSet::from([a_nodes[0]]),
            BTreeSet::from([a_nodes[1]]),
        ];
        let inverse = pg.apply(Operation::MultiSplit { partition: a_part, groups }).unwrap();
        assert_eq!(pg.get_nodes().len(), before + 1);

        pg.apply(inverse).unwrap();
        assert_eq!(pg.get_nodes().len(), before);
    }

    #[test]
    fn sentinel_split_is_rejected() {
        let g = TraceGraph::from_chains(vec![vec![ev("a")]]).unwrap();
        let mut pg = PartitionGraph::initialize_from(&g, &[]).unwrap();
        let initial = pg.initial();
        let nodes = pg.partition(initial).unwrap().nodes().clone();
        let err = pg
            .apply(Operation::MultiSplit {
                partition: initial,
                groups: vec![nodes.clone(), BTreeSet::new()],
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::PartitionInvariantViolation { .. }));
    }

    #[test]
    fn s5_afby_counterexample_is_found_before_refinement() {
        // [a,b] and [a,c]: the single `a` partition has two successors, so
        // AFby(a,b) is violated by the branch that goes to `c`.
        let g = TraceGraph::from_chains(vec![vec![ev("a"), ev("b")], vec![ev("a"), ev("c")]]).unwrap();
        let pg = PartitionGraph::initialize_from(&g, &[]).unwrap();
        let inv = Invariant::new(EventType::Label("a".into()), EventType::Label("b".into()), InvariantKind::AlwaysFollowedBy);
        let cex = pg.get_counterexample(&inv);
        assert!(cex.is_some());
    }
}
