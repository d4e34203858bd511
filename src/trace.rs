//! Trace graph construction (spec §3, §4.1, component B).
//!
//! A [`TraceGraph`] is the disjoint union of [`Trace`]s plus one shared
//! `INITIAL` and one shared `TERMINAL` node that every trace points
//! from/to. Nodes are arena-allocated entries in a
//! `petgraph::stable_graph::StableDiGraph`; a node's [`EventNodeId`] is the
//! `NodeIndex` petgraph hands out, which stays stable for the lifetime of
//! the graph because `TraceGraph` is immutable after construction (spec
//! §3 "Lifecycles").

use std::collections::{BTreeMap, BTreeSet};

use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{CoreError, CoreResult};
use crate::event::{Event, EventType};
use crate::vector_clock::VectorClock;

/// Stable identifier for an event node within one [`TraceGraph`].
pub type EventNodeId = petgraph::graph::NodeIndex<u32>;

/// The default ordering relation, carried by every transition in a `Chains`
/// graph and by the causal-successor edges of a `DAGs` graph.
pub const ORDERING_RELATION: &str = "t";

/// The set of relation tags labeling one transition. A transition can carry
/// more than one tag (e.g. the default ordering relation plus a
/// domain-specific relation that happens to coincide with it).
pub type RelationSet = BTreeSet<String>;

fn relation_set_of(tag: &str) -> RelationSet {
    let mut set = RelationSet::new();
    set.insert(tag.to_string());
    set
}

/// Node weight: just the underlying event. Kept separate from `EventNodeId`
/// so that node identity (the index) and node content (the event) are never
/// confused.
#[derive(Debug, Clone)]
pub struct EventNodeData {
    /// The event this node occurred as.
    pub event: Event,
}

/// One connected trace: all event nodes reachable from a single input
/// partition, plus pointers to the shared sentinels it is rooted/sunk at.
#[derive(Debug, Clone)]
pub struct Trace {
    /// Non-sentinel event nodes, in the order they were supplied.
    pub nodes: Vec<EventNodeId>,
    /// The shared `INITIAL` node (same for every trace in a graph).
    pub initial: EventNodeId,
    /// The shared `TERMINAL` node (same for every trace in a graph).
    pub terminal: EventNodeId,
}

/// Which construction strategy produced a [`TraceGraph`]: totally ordered
/// chains, or vector-clock-ordered DAGs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceGraphShape {
    /// Every trace is a linear chain: total order.
    Chains,
    /// Every trace is a DAG ordered by vector clocks: partial order.
    Dags,
}

/// The disjoint union of traces plus one shared `INITIAL`/`TERMINAL` pair.
pub struct TraceGraph {
    graph: StableDiGraph<EventNodeData, RelationSet>,
    initial: EventNodeId,
    terminal: EventNodeId,
    traces: Vec<Trace>,
    shape: TraceGraphShape,
}

impl TraceGraph {
    /// Builds a `Chains`-shaped trace graph: one linear chain per input
    /// trace, each node connected to the next by the ordering relation, with
    /// the shared `INITIAL`/`TERMINAL` sentinels prepended/appended.
    pub fn from_chains(traces: Vec<Vec<Event>>) -> CoreResult<Self> {
        let mut graph = StableDiGraph::new();
        let initial = graph.add_node(EventNodeData { event: Event::initial() });
        let terminal = graph.add_node(EventNodeData { event: Event::terminal() });

        let mut built_traces = Vec::with_capacity(traces.len());
        for events in traces {
            if events.is_empty() {
                return Err(CoreError::EmptyTrace);
            }
            for event in &events {
                if event.event_type.is_sentinel() {
                    return Err(CoreError::DuplicateSentinel(event.event_type.clone()));
                }
            }

            let mut nodes = Vec::with_capacity(events.len());
            for event in events {
                nodes.push(graph.add_node(EventNodeData { event }));
            }

            let mut cursor = initial;
            for &node in &nodes {
                graph.add_edge(cursor, node, relation_set_of(ORDERING_RELATION));
                cursor = node;
            }
            graph.add_edge(cursor, terminal, relation_set_of(ORDERING_RELATION));

            built_traces.push(Trace {
                nodes,
                initial,
                terminal,
            });
        }

        Ok(TraceGraph {
            graph,
            initial,
            terminal,
            traces: built_traces,
            shape: TraceGraphShape::Chains,
        })
    }

    /// Builds a `DAGs`-shaped trace graph: each trace's events carry a
    /// vector-clock timestamp, and an edge `u -> v` is added iff
    /// `clock(u)` immediately precedes `clock(v)` under the componentwise
    /// partial order (no event's clock sits strictly between the two).
    ///
    /// Rejects traces whose clocks are inconsistent: two distinct events in
    /// the same trace carrying an identical vector clock cannot be placed
    /// in the DAG unambiguously.
    pub fn from_dags(traces: Vec<Vec<(Event, VectorClock)>>) -> CoreResult<Self> {
        let mut graph = StableDiGraph::new();
        let initial = graph.add_node(EventNodeData { event: Event::initial() });
        let terminal = graph.add_node(EventNodeData { event: Event::terminal() });

        let mut built_traces = Vec::with_capacity(traces.len());
        for timestamped in traces {
            if timestamped.is_empty() {
                return Err(CoreError::EmptyTrace);
            }
            for (event, _) in &timestamped {
                if event.event_type.is_sentinel() {
                    return Err(CoreError::DuplicateSentinel(event.event_type.clone()));
                }
            }
            for i in 0..timestamped.len() {
                for j in (i + 1)..timestamped.len() {
                    if timestamped[i].1 == timestamped[j].1 {
                        return Err(CoreError::InconsistentVectorClocks {
                            detail: format!(
                                "events {i} and {j} in the same trace share an identical vector clock"
                            ),
                        });
                    }
                }
            }

            let clocks: Vec<VectorClock> = timestamped.iter().map(|(_, c)| c.clone()).collect();
            let mut nodes = Vec::with_capacity(timestamped.len());
            for (event, _) in timestamped {
                nodes.push(graph.add_node(EventNodeData { event }));
            }

            // Root(s): events with no predecessor in this trace attach to INITIAL.
            // Sink(s): events with no successor attach to TERMINAL.
            let mut has_predecessor = vec![false; nodes.len()];
            let mut has_successor = vec![false; nodes.len()];

            for i in 0..nodes.len() {
                for j in 0..nodes.len() {
                    if i == j {
                        continue;
                    }
                    if !clocks[i].happens_before(&clocks[j]) {
                        continue;
                    }
                    // i happens-before j: keep only if no k sits strictly between.
                    let immediate = !(0..nodes.len()).any(|k| {
                        k != i && k != j && clocks[i].happens_before(&clocks[k]) && clocks[k].happens_before(&clocks[j])
                    });
                    if immediate {
                        graph.add_edge(nodes[i], nodes[j], relation_set_of(ORDERING_RELATION));
                        has_successor[i] = true;
                        has_predecessor[j] = true;
                    }
                }
            }

            for (idx, &node) in nodes.iter().enumerate() {
                if !has_predecessor[idx] {
                    graph.add_edge(initial, node, relation_set_of(ORDERING_RELATION));
                }
                if !has_successor[idx] {
                    graph.add_edge(node, terminal, relation_set_of(ORDERING_RELATION));
                }
            }

            built_traces.push(Trace {
                nodes,
                initial,
                terminal,
            });
        }

        Ok(TraceGraph {
            graph,
            initial,
            terminal,
            traces: built_traces,
            shape: TraceGraphShape::Dags,
        })
    }

    /// Tags an existing transition between two nodes with an additional
    /// relation. Used by input-format collaborators to attach secondary
    /// relations onto a chain built purely from the ordering relation.
    pub fn tag_relation(&mut self, from: EventNodeId, to: EventNodeId, relation: &str) -> bool {
        if let Some(edge) = self.graph.find_edge(from, to) {
            self.graph[edge].insert(relation.to_string());
            true
        } else {
            false
        }
    }

    /// The shared `INITIAL` node.
    pub fn initial(&self) -> EventNodeId {
        self.initial
    }

    /// The shared `TERMINAL` node.
    pub fn terminal(&self) -> EventNodeId {
        self.terminal
    }

    /// Whether this graph was built from totally or partially ordered
    /// input.
    pub fn shape(&self) -> TraceGraphShape {
        self.shape
    }

    /// All traces in this graph.
    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    /// The event carried by a node.
    pub fn event(&self, node: EventNodeId) -> &Event {
        &self.graph[node].event
    }

    /// The event type carried by a node; sentinel-aware.
    pub fn event_type(&self, node: EventNodeId) -> &EventType {
        &self.graph[node].event.event_type
    }

    /// Iterates `(target, relations)` for every outgoing transition of
    /// `node`, in a deterministic order (ascending target index).
    pub fn outgoing(&self, node: EventNodeId) -> Vec<(EventNodeId, &RelationSet)> {
        let mut out: Vec<(EventNodeId, &RelationSet)> = self
            .graph
            .edges_directed(node, Direction::Outgoing)
            .map(|edge| (edge.target(), edge.weight()))
            .collect();
        out.sort_by_key(|(target, _)| target.index());
        out
    }

    /// Outgoing transitions restricted to a single relation tag, in
    /// deterministic order.
    pub fn outgoing_on(&self, node: EventNodeId, relation: &str) -> Vec<EventNodeId> {
        self.outgoing(node)
            .into_iter()
            .filter(|(_, rels)| rels.contains(relation))
            .map(|(target, _)| target)
            .collect()
    }

    /// Every relation tag present anywhere in this graph, sorted.
    pub fn relations(&self) -> BTreeSet<String> {
        let mut all = BTreeSet::new();
        for edge in self.graph.edge_weights() {
            all.extend(edge.iter().cloned());
        }
        all
    }

    /// Total number of non-sentinel event nodes.
    pub fn event_count(&self) -> usize {
        self.traces.iter().map(|t| t.nodes.len()).sum()
    }

    /// Number of traces in this graph.
    pub fn trace_count(&self) -> usize {
        self.traces.len()
    }

    /// All non-sentinel event node ids across every trace, in trace then
    /// within-trace order.
    pub fn all_event_nodes(&self) -> Vec<EventNodeId> {
        self.traces.iter().flat_map(|t| t.nodes.iter().copied()).collect()
    }

    /// Groups every non-sentinel event node (plus the two sentinels) by
    /// event type, the seed partitioning used by
    /// [`crate::partition::PartitionGraph::initialize_from`].
    pub fn nodes_by_type(&self) -> BTreeMap<EventType, Vec<EventNodeId>> {
        let mut map: BTreeMap<EventType, Vec<EventNodeId>> = BTreeMap::new();
        map.entry(EventType::INITIAL).or_default().push(self.initial);
        map.entry(EventType::TERMINAL).or_default().push(self.terminal);
        for node in self.all_event_nodes() {
            map.entry(self.event_type(node).clone()).or_default().push(node);
        }
        map
    }
}

impl crate::ktails::Behavioral for TraceGraph {
    type Node = EventNodeId;

    fn node_type(&self, node: EventNodeId) -> EventType {
        self.event_type(node).clone()
    }

    fn successors(&self, node: EventNodeId) -> Vec<EventNodeId> {
        self.outgoing(node).into_iter().map(|(target, _)| target).collect()
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
    fn chain_trace_wires_initial_and_terminal() {
        let g = TraceGraph::from_chains(vec![vec![ev("open"), ev("read"), ev("close")]]).unwrap();
        let trace = &g.traces()[0];
        assert_eq!(trace.nodes.len(), 3);

        let from_initial = g.outgoing(g.initial());
        assert_eq!(from_initial.len(), 1);
        assert_eq!(from_initial[0].0, trace.nodes[0]);

        let from_last = g.outgoing(trace.nodes[2]);
        assert_eq!(from_last.len(), 1);
        assert_eq!(from_last[0].0, g.terminal());
    }

    #[test]
    fn empty_trace_is_rejected() {
        let err = TraceGraph::from_chains(vec![vec![]]).unwrap_err();
        assert!(matches!(err, CoreError::EmptyTrace));
    }

    #[test]
    fn sentinel_in_input_is_rejected() {
        let err = TraceGraph::from_chains(vec![vec![Event::initial()]]).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateSentinel(_)));
    }

    #[test]
    fn dag_trace_links_immediate_causal_successors_only() {
        // a@(1,0), b@(2,1): a happens-before b, directly.
        let a = VectorClock::from_pairs([(0, 1)]);
        let b = VectorClock::from_pairs([(0, 2), (1, 1)]);
        let c = VectorClock::from_pairs([(0, 1), (1, 2)]);

        let g = TraceGraph::from_dags(vec![vec![(ev("a"), a), (ev("b"), b), (ev("c"), c)]]).unwrap();
        let trace = &g.traces()[0];
        let (a_id, b_id, c_id) = (trace.nodes[0], trace.nodes[1], trace.nodes[2]);

        // a -> b and a -> c should both exist (a happens-before both, nothing between).
        let from_a: Vec<_> = g.outgoing(a_id).into_iter().map(|(t, _)| t).collect();
        assert!(from_a.contains(&b_id));
        assert!(from_a.contains(&c_id));
    }

    #[test]
    fn dag_with_duplicate_clocks_is_rejected() {
        let a = VectorClock::from_pairs([(0, 1)]);
        let err = TraceGraph::from_dags(vec![vec![(ev("a"), a.clone()), (ev("b"), a)]]).unwrap_err();
        assert!(matches!(err, CoreError::InconsistentVectorClocks { .. }));
    }

    #[test]
    fn nodes_by_type_groups_sentinels_separately() {
        let g = TraceGraph::from_chains(vec![vec![ev("open"), ev("close")]]).unwrap();
        let by_type = g.nodes_by_type();
        assert_eq!(by_type[&EventType::INITIAL].len(), 1);
        assert_eq!(by_type[&EventType::TERMINAL].len(), 1);
        assert_eq!(by_type[&EventType::Label("open".into())].len(), 1);
    }
}
