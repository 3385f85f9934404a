//! Structural queries over a calculation graph and the transforms that prune it into a forest.
//!
//! Every transform takes the graph by reference and returns a new graph.

use crate::compute::ExplosionError;
use crate::config::OnConflict;
use crate::graph::{CalcEdge, CalculationGraph};
use crate::store::NodeId;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::unionfind::UnionFind;
use petgraph::visit::{EdgeRef, IntoEdgeReferences, NodeIndexable};
use std::collections::{BTreeSet, HashSet, VecDeque};
use tracing::{debug, error, warn};

/// Nodes no calculation references.
pub fn roots(graph: &CalculationGraph) -> BTreeSet<NodeId> {
    graph.node_ids().into_iter().filter(|n| graph.in_degree(n) == 0).collect()
}

/// Nodes without calculation components.
pub fn leaves(graph: &CalculationGraph) -> BTreeSet<NodeId> {
    graph.node_ids().into_iter().filter(|n| graph.out_degree(n) == 0).collect()
}

/// `starts` and every node their calculations depend on, directly or not.
pub fn descendants(graph: &CalculationGraph, starts: &[NodeId]) -> BTreeSet<NodeId> {
    walk(starts, |n| graph.children(n))
}

/// `starts` and every node whose calculation depends on them.
pub fn ancestors(graph: &CalculationGraph, starts: &[NodeId]) -> BTreeSet<NodeId> {
    walk(starts, |n| graph.parents(n))
}

fn walk<F>(starts: &[NodeId], next: F) -> BTreeSet<NodeId>
where
    F: Fn(&NodeId) -> Vec<NodeId>,
{
    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::from(starts.to_vec());
    while let Some(node) = queue.pop_front() {
        if visited.insert(node.clone()) {
            queue.extend(next(&node));
        }
    }
    visited
}

pub fn is_acyclic(graph: &CalculationGraph) -> bool {
    !is_cyclic_directed(&graph.graph)
}

/// Checks the graph for directed cycles. Returns whether it is acyclic, or an
/// error naming a node on a cycle when `policy` is [`OnConflict::Error`].
pub fn check_acyclic(graph: &CalculationGraph, policy: OnConflict) -> Result<bool, ExplosionError> {
    let Err(cycle) = toposort(&graph.graph, None) else {
        return Ok(true);
    };
    let node = graph.graph[cycle.node_id()].id.clone();
    match policy {
        OnConflict::Error => Err(ExplosionError::CycleDetected { node }),
        OnConflict::Log => {
            error!("Calculations contain a cycle through {}; continuing.", node);
            Ok(false)
        }
    }
}

/// A forest is acyclic and no node has more than one parent.
pub fn is_forest(graph: &CalculationGraph) -> bool {
    is_acyclic(graph) && graph.node_ids().iter().all(|n| graph.in_degree(n) <= 1)
}

/// Number of weakly connected components.
pub fn weak_component_count(graph: &CalculationGraph) -> usize {
    let g = &graph.graph;
    let mut sets = UnionFind::new(g.node_bound());
    for e in g.edge_references() {
        sets.union(e.source().index(), e.target().index());
    }
    g.node_indices()
        .map(|ix| sets.find(ix.index()))
        .collect::<HashSet<_>>()
        .len()
}

/// Nodes with more than one parent.
pub fn stepchildren(graph: &CalculationGraph) -> BTreeSet<NodeId> {
    graph.node_ids().into_iter().filter(|n| graph.in_degree(n) > 1).collect()
}

/// Parents of the stepchildren.
pub fn stepparents(graph: &CalculationGraph) -> BTreeSet<NodeId> {
    stepchildren(graph).iter().flat_map(|n| graph.parents(n)).collect()
}

/// A node that relays one child (and a correction) to its single parent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Passthrough {
    pub node: NodeId,
    pub parent: NodeId,
    pub child: NodeId,
    pub correction: NodeId,
}

/// Nodes with exactly one parent and exactly two children, one of which is the
/// correction of the other child or of the node itself. Ordered by node.
pub fn passthroughs(graph: &CalculationGraph) -> Vec<Passthrough> {
    graph.node_ids().into_iter().filter_map(|node| passthrough_at(graph, node)).collect()
}

fn passthrough_at(graph: &CalculationGraph, node: NodeId) -> Option<Passthrough> {
    let parents = graph.parents(&node);
    let children = graph.children(&node);
    let ([parent], [a, b]) = (parents.as_slice(), children.as_slice()) else {
        return None;
    };
    let (child, correction) = if b.is_correction_of(a) || *b == node.correction() {
        (a, b)
    } else if a.is_correction_of(b) || *a == node.correction() {
        (b, a)
    } else {
        return None;
    };
    if child == parent || correction == parent {
        return None;
    }
    Some(Passthrough {
        parent: parent.clone(),
        child: child.clone(),
        correction: correction.clone(),
        node,
    })
}

/// Restricts the graph to the seeds and their descendants. No seeds keeps every node.
pub fn seeded_digraph(graph: &CalculationGraph, seeds: &[NodeId]) -> CalculationGraph {
    if seeds.is_empty() {
        return graph.clone();
    }
    graph.subgraph(&descendants(graph, seeds))
}

/// Elides passthrough nodes one at a time, smallest first, until none are left.
/// After an elision only the nodes whose edges changed are checked again.
///
/// The passthrough's parent is linked straight to its substantive child, with
/// the product of the two edge weights. The passthrough and its correction
/// child are dropped; the correction only if no other calculation uses it.
/// The passthrough's tags are pushed down onto the child.
pub fn prune_passthroughs(
    graph: &CalculationGraph,
    on_tag_conflict: OnConflict,
) -> Result<CalculationGraph, ExplosionError> {
    let mut pruned = graph.clone();
    let mut pending = pruned.node_ids();
    let mut elided = 0;
    while let Some(node) = pending.pop_first() {
        let Some(pt) = passthrough_at(&pruned, node) else { continue };
        let mut touched = pruned.children(&pt.correction);
        touched.extend([pt.parent.clone(), pt.child.clone(), pt.correction.clone()]);
        elide(&mut pruned, &pt, on_tag_conflict)?;
        elided += 1;
        for touched in touched {
            if pruned.contains(&touched) {
                pending.insert(touched);
            }
        }
    }
    debug!("Elided {} passthrough nodes.", elided);
    Ok(pruned)
}

fn elide(graph: &mut CalculationGraph, pt: &Passthrough, on_tag_conflict: OnConflict) -> Result<(), ExplosionError> {
    let upper = graph.edge_weight(&pt.parent, &pt.node).unwrap_or(1.0);
    let lower = graph.edge_weight(&pt.node, &pt.child).unwrap_or(1.0);
    let weight = graph.edge_weight(&pt.parent, &pt.child).unwrap_or(0.0) + upper * lower;

    let inherited = graph.node(&pt.node).map(|n| n.tags.clone()).unwrap_or_default();
    if let Some(child) = graph.node_mut(&pt.child) {
        for (tag, value) in inherited {
            match child.tags.get(&tag).cloned() {
                None => {
                    child.tags.insert(tag, value);
                }
                Some(own) if own == value => {}
                Some(own) => match on_tag_conflict {
                    OnConflict::Error => {
                        return Err(ExplosionError::TagConflict {
                            node: pt.child.clone(),
                            tag,
                            first: value,
                            second: own,
                        })
                    }
                    OnConflict::Log => warn!(
                        "{} keeps {}={} over {} inherited from passthrough {}.",
                        pt.child, tag, own, value, pt.node
                    ),
                },
            }
        }
    }

    graph.remove_node(&pt.node);
    if graph.in_degree(&pt.correction) == 0 {
        graph.remove_node(&pt.correction);
    }
    graph.set_edge(
        pt.parent.clone(),
        pt.child.clone(),
        CalcEdge { weight, spliced_from: Some(pt.node.clone()) },
    );
    debug!("Elided passthrough {}: {} -> {} (weight {}).", pt.node, pt.parent, pt.child, weight);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn n(f: &str) -> NodeId { NodeId::new("t", f) }

    fn set(fs: &[&str]) -> BTreeSet<NodeId> { fs.iter().map(|f| n(f)).collect() }

    fn graph(edges: &[(&str, &str, f64)]) -> CalculationGraph {
        let mut g = CalculationGraph::new();
        for &(p, c, w) in edges {
            g.add_edge(n(p), n(c), CalcEdge::new(w)).unwrap();
        }
        g
    }

    #[test]
    fn test_roots_leaves_and_reachability() {
        let g = graph(&[("a", "b", 1.0), ("b", "c", 1.0), ("b", "d", -1.0), ("x", "y", 1.0)]);
        assert_eq!(roots(&g), set(&["a", "x"]));
        assert_eq!(leaves(&g), set(&["c", "d", "y"]));
        assert_eq!(descendants(&g, &[n("b")]), set(&["b", "c", "d"]));
        assert_eq!(ancestors(&g, &[n("d")]), set(&["a", "b", "d"]));
        assert_eq!(weak_component_count(&g), 2);
        assert!(is_forest(&g));
    }

    #[rstest]
    #[case(OnConflict::Error, true)]
    #[case(OnConflict::Log, false)]
    fn test_cycle_policy(#[case] policy: OnConflict, #[case] fails: bool) {
        let g = graph(&[("a", "b", 1.0), ("b", "c", 1.0), ("c", "a", 1.0)]);
        let result = check_acyclic(&g, policy);
        assert_eq!(result.is_err(), fails);
        if let Ok(acyclic) = result {
            assert!(!acyclic);
        }
        assert!(!is_forest(&g));
    }

    #[test]
    fn test_stepchildren_break_the_forest() {
        let g = graph(&[("a", "c", 1.0), ("b", "c", 1.0), ("a", "d", 1.0)]);
        assert!(is_acyclic(&g));
        assert!(!is_forest(&g));
        assert_eq!(stepchildren(&g), set(&["c"]));
        assert_eq!(stepparents(&g), set(&["a", "b"]));
    }

    #[test]
    fn test_seeded_digraph_keeps_seed_descendants() {
        let g = graph(&[("a", "b", 1.0), ("b", "c", 1.0), ("x", "c", 1.0), ("x", "y", 1.0)]);
        let seeded = seeded_digraph(&g, &[n("a")]);
        assert_eq!(seeded.node_ids(), set(&["a", "b", "c"]));
        assert_eq!(seeded.parents(&n("c")), vec![n("b")]);
        assert_eq!(seeded_digraph(&g, &[]).node_count(), g.node_count());
    }

    #[test]
    fn test_passthrough_is_elided() {
        let g = graph(&[("a", "b", 1.0), ("b", "c", -1.0), ("b", "c_correction", 1.0), ("a", "z", 1.0)]);
        assert_eq!(passthroughs(&g).len(), 1);

        let forest = prune_passthroughs(&g, OnConflict::Error).unwrap();
        assert!(!forest.contains(&n("b")));
        assert!(!forest.contains(&n("c_correction")));
        let edge = forest.edge(&n("a"), &n("c")).unwrap();
        assert_eq!(edge.weight, -1.0);
        assert_eq!(edge.spliced_from, Some(n("b")));
        assert!(is_forest(&forest));
        // The input graph is left as it was.
        assert!(g.contains(&n("b")));
    }

    #[test]
    fn test_passthrough_with_its_own_correction() {
        let g = graph(&[("a", "b", 1.0), ("b", "c", 1.0), ("b", "b_correction", 1.0)]);
        let forest = prune_passthroughs(&g, OnConflict::Error).unwrap();
        assert_eq!(forest.node_ids(), set(&["a", "c"]));
    }

    #[test]
    fn test_chained_passthroughs_are_elided_repeatedly() {
        let g = graph(&[
            ("a", "b", 1.0),
            ("b", "c", 1.0),
            ("b", "c_correction", 1.0),
            ("c", "d", -1.0),
            ("c", "d_correction", 1.0),
        ]);
        let forest = prune_passthroughs(&g, OnConflict::Error).unwrap();
        assert_eq!(forest.node_ids(), set(&["a", "d"]));
        assert_eq!(forest.edge_weight(&n("a"), &n("d")), Some(-1.0));
    }

    #[test]
    fn test_long_passthrough_chain_collapses_to_one_edge() {
        let depth = 300;
        let level = |i: usize| n(&format!("l{:03}", i));
        let mut g = CalculationGraph::new();
        for i in 0..depth {
            let weight = if i % 2 == 0 { -1.0 } else { 1.0 };
            g.add_edge(level(i), level(i + 1), CalcEdge::new(weight)).unwrap();
            if i > 0 {
                g.add_edge(level(i), level(i + 1).correction(), CalcEdge::new(1.0)).unwrap();
            }
        }
        let forest = prune_passthroughs(&g, OnConflict::Error).unwrap();
        assert_eq!(forest.node_ids(), [level(0), level(depth)].into_iter().collect());
        let edge = forest.edge(&level(0), &level(depth)).unwrap();
        assert_eq!(edge.weight, 1.0);
        assert_eq!(edge.spliced_from, Some(level(depth - 1)));
    }

    #[test]
    fn test_shared_correction_child_survives() {
        let g = graph(&[("a", "b", 1.0), ("b", "c", 1.0), ("b", "c_correction", 1.0), ("q", "c_correction", 1.0)]);
        let forest = prune_passthroughs(&g, OnConflict::Error).unwrap();
        assert!(forest.contains(&n("c_correction")));
        assert_eq!(forest.parents(&n("c_correction")), vec![n("q")]);
    }

    #[test]
    fn test_passthrough_tags_conflict() {
        let mut g = graph(&[("a", "b", 1.0), ("b", "c", 1.0), ("b", "c_correction", 1.0)]);
        g.node_mut(&n("b")).unwrap().tags.insert("in_rate_base".into(), "yes".into());
        g.node_mut(&n("c")).unwrap().tags.insert("in_rate_base".into(), "no".into());

        let err = prune_passthroughs(&g, OnConflict::Error).unwrap_err();
        assert!(matches!(err, ExplosionError::TagConflict { .. }));

        let forest = prune_passthroughs(&g, OnConflict::Log).unwrap();
        assert_eq!(forest.node(&n("c")).unwrap().tags["in_rate_base"], "no");
    }

    // A random tree whose every inner node may be wrapped in a passthrough level.
    fn tree_edges() -> impl Strategy<Value = Vec<(usize, usize, bool, bool)>> {
        (2usize..24).prop_flat_map(|size| {
            (1..size)
                .map(|i| (0..i, any::<bool>(), any::<bool>()).prop_map(move |(p, neg, wrap)| (p, i, neg, wrap)))
                .collect::<Vec<_>>()
        })
    }

    fn wrapped_tree(edges: Vec<(usize, usize, bool, bool)>) -> CalculationGraph {
        let mut g = CalculationGraph::new();
        for (p, c, neg, wrap) in edges {
            let weight = if neg { -1.0 } else { 1.0 };
            let (parent, child) = (n(&format!("f{}", p)), n(&format!("f{}", c)));
            if wrap {
                let relay = n(&format!("relay{}", c));
                g.add_edge(parent, relay.clone(), CalcEdge::new(1.0)).unwrap();
                g.add_edge(relay, child.clone(), CalcEdge::new(weight)).unwrap();
                g.add_edge(n(&format!("relay{}", c)), child.correction(), CalcEdge::new(1.0)).unwrap();
            } else {
                g.add_edge(parent, child, CalcEdge::new(weight)).unwrap();
            }
        }
        g
    }

    // Elides the smallest passthrough of a full rescan each round.
    fn prune_by_rescan(graph: &CalculationGraph) -> CalculationGraph {
        let mut pruned = graph.clone();
        while let Some(pt) = passthroughs(&pruned).into_iter().next() {
            elide(&mut pruned, &pt, OnConflict::Error).unwrap();
        }
        pruned
    }

    proptest! {
        #[test]
        fn prop_pruned_trees_are_forests(edges in tree_edges()) {
            let g = wrapped_tree(edges);
            let forest = prune_passthroughs(&g, OnConflict::Error).unwrap();
            prop_assert!(is_forest(&forest));
            prop_assert!(forest.node_ids().iter().all(|x| !x.xbrl_factoid.starts_with("relay")));
            prop_assert!(passthroughs(&forest).is_empty());
        }

        #[test]
        fn prop_worklist_matches_full_rescan(edges in tree_edges()) {
            let g = wrapped_tree(edges);
            let forest = prune_passthroughs(&g, OnConflict::Error).unwrap();
            let rescanned = prune_by_rescan(&g);
            prop_assert_eq!(forest.node_ids(), rescanned.node_ids());
            prop_assert_eq!(forest.edges(), rescanned.edges());
        }
    }
}
