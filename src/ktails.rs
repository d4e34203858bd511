//! K-tails equivalence (spec §4.2, component F).
//!
//! Defined generically over anything that looks like a graph of typed nodes
//! with outgoing transitions (Design Notes, "Polymorphic graph views"): both
//! a [`crate::trace::TraceGraph`] (nodes = event nodes) and a
//! [`crate::partition::PartitionGraph`] (nodes = partitions) implement
//! [`Behavioral`], so the coarsening engine can ask "are these two
//! partitions k-equivalent" with the exact same recursion used to seed the
//! initial quotient from a trace graph.

use std::collections::HashMap;

use crate::error::CoreResult;
use crate::event::EventType;
use crate::partition::PartitionGraph;
use crate::trace::TraceGraph;

/// A graph of typed nodes with outgoing transitions, the minimal capability
/// k-tails needs. `successors` must return targets in a deterministic
/// order; both implementations in this crate sort by the target's stable
/// integer id.
pub trait Behavioral {
    /// The node identifier type (e.g. `EventNodeId`, `PartitionId`).
    type Node: Copy + Eq + Ord + std::hash::Hash;

    /// The event type labeling `node`.
    fn node_type(&self, node: Self::Node) -> EventType;

    /// `node`'s outgoing neighbors, across every relation, in a
    /// deterministic order.
    fn successors(&self, node: Self::Node) -> Vec<Self::Node>;
}

/// Memoizes `(a, b, k)` results within one batch of k-tails queries (spec
/// §4.2: "memoize ... within a single query batch"). A session is scoped to
/// one fixed pair of graphs for its whole lifetime — comparing nodes from a
/// third graph calls for a fresh session, since node ids are only unique
/// within their own graph.
pub struct KTailsSession<N> {
    memo: HashMap<(N, N, u32), bool>,
}

impl<N: Copy + Eq + Ord + std::hash::Hash> Default for KTailsSession<N> {
    fn default() -> Self {
        Self { memo: HashMap::new() }
    }
}

impl<N: Copy + Eq + Ord + std::hash::Hash> KTailsSession<N> {
    /// A fresh, empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// `kEquals(a, b, k)`: symmetric, reflexive, bounded-depth behavioral
    /// equivalence (spec §4.2). `a` is a node of `ga`, `b` a node of `gb`;
    /// pass the same graph twice to compare two nodes of one graph.
    pub fn k_equals<G>(&mut self, ga: &G, a: N, gb: &G, b: N, k: u32) -> bool
    where
        G: Behavioral<Node = N>,
    {
        let key = (a, b, k);
        if let Some(&cached) = self.memo.get(&key) {
            return cached;
        }
        // `N` (`EventNodeId`/`PartitionId`) is a bare `petgraph::NodeIndex`:
        // its equality is just the inner integer, with no graph identity
        // attached, so two nodes from *different* graphs can share an id
        // (every `from_chains` graph numbers INITIAL=0, TERMINAL=1, ...).
        // `a == b` is therefore only a meaningful reflexivity check when
        // `ga` and `gb` are the same graph; `ptr::eq` tells them apart.
        let reflexive = std::ptr::eq(ga, gb) && a == b;
        // Guard against infinite recursion while the answer is being
        // computed: a node is reflexively equivalent to itself at any
        // depth, and mutual recursion through equal-typed cycles can
        // otherwise revisit `key` before it's first resolved.
        self.memo.insert(key, reflexive);
        let result = self.compute(ga, a, gb, b, k);
        self.memo.insert(key, result);
        result
    }

    fn compute<G>(&mut self, ga: &G, a: N, gb: &G, b: N, k: u32) -> bool
    where
        G: Behavioral<Node = N>,
    {
        if ga.node_type(a) != gb.node_type(b) {
            return false;
        }
        if std::ptr::eq(ga, gb) && a == b {
            return true;
        }
        if k == 0 {
            return true;
        }

        let sa = sorted_by_type(ga, ga.successors(a));
        let sb = sorted_by_type(gb, gb.successors(b));
        if sa.len() != sb.len() {
            return false;
        }

        self.bijection_exists(ga, &sa, gb, &sb, k - 1)
    }

    /// Backtracking search for a perfect bipartite matching between `sa` and
    /// `sb` where every matched pair is `(k)`-equivalent. Candidate sets are
    /// small in practice (bounded by a node's fan-out), so naive
    /// backtracking is sufficient.
    fn bijection_exists<G>(&mut self, ga: &G, sa: &[N], gb: &G, sb: &[N], k: u32) -> bool
    where
        G: Behavioral<Node = N>,
    {
        if sa.is_empty() {
            return true;
        }
        let (first, rest) = sa.split_first().unwrap();
        for (i, &cand) in sb.iter().enumerate() {
            if self.k_equals(ga, *first, gb, cand, k) {
                let mut remaining = sb.to_vec();
                remaining.remove(i);
                if self.bijection_exists(ga, rest, gb, &remaining, k) {
                    return true;
                }
            }
        }
        false
    }

    /// Convenience for the common case of comparing two nodes of the same
    /// graph.
    pub fn k_equals_within<G>(&mut self, g: &G, a: N, b: N, k: u32) -> bool
    where
        G: Behavioral<Node = N>,
    {
        self.k_equals(g, a, g, b, k)
    }
}

/// Sorts nodes by event-type label then by the node's own ordering, the
/// stable tie-break spec §4.2 requires of the bijection search.
fn sorted_by_type<G: Behavioral>(g: &G, mut nodes: Vec<G::Node>) -> Vec<G::Node> {
    nodes.sort_by(|a, b| g.node_type(*a).cmp(&g.node_type(*b)).then_with(|| a.cmp(b)));
    nodes
}

/// `performKTails(traceGraph, k)` (spec §4.2/§4.5): groups every event node
/// (sentinels included) into k-equivalence classes and builds the resulting
/// [`PartitionGraph`]. Classes are assembled greedily in node order — each
/// node joins the first existing class whose representative is `k`-
/// equivalent to it, or starts a new one — rather than computing a fully
/// general equivalence relation, since `k_equals` is not guaranteed
/// transitive for `k >= 1` (spec §4.2, Open Questions).
pub fn perform_k_tails(trace_graph: &TraceGraph, k: u32) -> CoreResult<PartitionGraph<'_>> {
    let mut session = KTailsSession::new();
    let mut class_reps: Vec<crate::trace::EventNodeId> = Vec::new();
    let mut groups: Vec<Vec<crate::trace::EventNodeId>> = Vec::new();

    let mut all_nodes = trace_graph.all_event_nodes();
    all_nodes.insert(0, trace_graph.initial());
    all_nodes.push(trace_graph.terminal());

    for node in all_nodes {
        let mut placed = false;
        for (i, &rep) in class_reps.iter().enumerate() {
            if session.k_equals_within(trace_graph, rep, node, k) {
                groups[i].push(node);
                placed = true;
                break;
            }
        }
        if !placed {
            class_reps.push(node);
            groups.push(vec![node]);
        }
    }

    PartitionGraph::from_groups(trace_graph, groups)
}

#[cfg(test)]
mod perform_k_tails_tests {
    use super::*;
    use crate::event::Event;

    fn ev(label: &str) -> Event {
        Event::new(EventType::Label(label.to_string()))
    }

    #[test]
    fn s1_two_identical_traces_collapse_fully_at_k1() {
        let g = TraceGraph::from_chains(vec![
            vec![ev("a"), ev("b"), ev("c")],
            vec![ev("a"), ev("b"), ev("c")],
        ])
        .unwrap();
        let pg = perform_k_tails(&g, 1).unwrap();
        // INITIAL, a, b, c, TERMINAL: five classes even though two traces
        // contributed two nodes of each type.
        assert_eq!(pg.get_nodes().len(), 5);
    }

    #[test]
    fn s2_diverging_tails_stay_split_at_k0() {
        let g = TraceGraph::from_chains(vec![vec![ev("a"), ev("b"), ev("c"), ev("d")], vec![ev("a"), ev("b"), ev("c"), ev("e")]]).unwrap();
        let pg = perform_k_tails(&g, 0).unwrap();
        // At k=0, equivalence is purely type-based: a,b,c collapse pairwise
        // across the two traces, d and e remain distinct singleton types.
        assert_eq!(pg.get_nodes().len(), 7); // INITIAL, a, b, c, d, e, TERMINAL
    }
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
    fn symmetry_and_reflexivity_hold() {
        let g = TraceGraph::from_chains(vec![vec![ev("a"), ev("b"), ev("c")]]).unwrap();
        let mut session = KTailsSession::new();
        let nodes = g.all_event_nodes();
        for &n in &nodes {
            assert!(session.k_equals_within(&g, n, n, 3));
        }
        for k in 0..5 {
            assert_eq!(
                session.k_equals_within(&g, nodes[0], nodes[1], k),
                session.k_equals_within(&g, nodes[1], nodes[0], k)
            );
        }
    }

    #[test]
    fn out_degree_mismatch_is_never_k_equivalent() {
        // a -> b, a -> c  vs.  a' -> b' only: mismatched fan-out at a/a'.
        let g = TraceGraph::from_chains(vec![vec![ev("a"), ev("b")], vec![ev("a"), ev("x"), ev("y")]]).unwrap();
        let mut session = KTailsSession::new();
        let a1 = g.traces()[0].nodes[0];
        let a2 = g.traces()[1].nodes[0];
        assert!(!session.k_equals_within(&g, a1, a2, 1));
    }

    #[test]
    fn s2_linear_divergence_scenario() {
        // Two independent single-chain graphs: a->b->c->d and a->b->c->e.
        // Comparing their (separate) INITIAL nodes and their (separate)
        // `a` nodes exercises true cross-graph k-tails comparison.
        //
        // Per the literal recursion of spec §4.2 (≈₀ is type-only, ≈ₖ
        // recurses into ≈ₖ₋₁ on paired successors), the first difference
        // (d vs e) sits 3 hops from `a` and 4 hops from INITIAL, so it
        // first becomes visible one k lower than a same-length-path
        // intuition might suggest: INITIAL diverges at k=4, `a` at k=3.
        let g1 = TraceGraph::from_chains(vec![vec![ev("a"), ev("b"), ev("c"), ev("d")]]).unwrap();
        let g2 = TraceGraph::from_chains(vec![vec![ev("a"), ev("b"), ev("c"), ev("e")]]).unwrap();
        let mut session = KTailsSession::new();

        for k in 0..=3 {
            assert!(session.k_equals(&g1, g1.initial(), &g2, g2.initial(), k), "k={k}");
        }
        assert!(!session.k_equals(&g1, g1.initial(), &g2, g2.initial(), 4));

        let mut session2 = KTailsSession::new();
        let a1 = g1.traces()[0].nodes[0];
        let a2 = g2.traces()[0].nodes[0];
        for k in 0..=2 {
            assert!(session2.k_equals(&g1, a1, &g2, a2, k), "k={k}");
        }
        assert!(!session2.k_equals(&g1, a1, &g2, a2, 3));
    }
}
