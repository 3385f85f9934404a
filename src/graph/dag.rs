//! dag.rs
//! Stores the calculation graph of an explosion and builds it from exploded metadata.

use super::edge::CalcEdge;
use super::node::CalcNode;
use crate::compute::ExplosionError;
use crate::store::{calculation_component_table, explode_source_tables, MetadataRow, NodeId, TagTable};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Directed graph of calculations: edges point from a calculated factoid to each of its components.
#[derive(Debug, Clone, Default)]
pub struct CalculationGraph {
    pub(crate) graph: StableDiGraph<CalcNode, CalcEdge>,
    index: HashMap<NodeId, NodeIndex>,
}

impl CalculationGraph {
    pub fn new() -> Self { Self::default() }

    /// Builds the graph of every calculation declared in `rows`.
    ///
    /// Multi-source components yield one edge per source table. Nodes only
    /// exist as endpoints of some edge; each node picks up its
    /// `xbrl_factoid_original` from its own metadata rows and its tags from `tags`.
    /// `excluded` nodes are dropped once the graph is complete.
    pub fn from_metadata<'a, I>(
        rows: I,
        tags: &TagTable,
        excluded: &BTreeSet<NodeId>,
    ) -> Result<Self, ExplosionError>
    where
        I: IntoIterator<Item = &'a MetadataRow>,
    {
        let rows: Vec<&MetadataRow> = rows.into_iter().collect();
        let mut calc = Self::new();

        // 1. One edge per (parent, component, source table)
        for comp in explode_source_tables(calculation_component_table(rows.iter().copied())) {
            let parent = comp.parent();
            for child in comp.component.nodes() {
                calc.add_edge(parent.clone(), child, CalcEdge::new(comp.component.weight))?;
            }
        }

        // 2. Node attributes
        for row in &rows {
            let node = row.node_id();
            if calc.contains(&node) {
                calc.set_original_factoid(&node, row.xbrl_factoid_original.as_deref())?;
            }
        }
        let ids: Vec<NodeId> = calc.index.keys().cloned().collect();
        for id in ids {
            let node_tags = tags.get(&id);
            if let Some(node) = calc.node_mut(&id) {
                node.tags = node_tags;
            }
        }

        // 3. Known-bad nodes
        let present: Vec<&NodeId> = excluded.iter().filter(|n| calc.contains(n)).collect();
        if !present.is_empty() {
            debug!("Removing {} excluded nodes from the calculation graph: {:?}", present.len(), present);
        }
        for node in excluded {
            calc.remove_node(node);
        }

        debug!(
            "Built calculation graph with {} nodes and {} edges.",
            calc.node_count(),
            calc.edge_count()
        );
        Ok(calc)
    }

    // --- Mutation ---

    /// Returns the index of `id`, adding an untagged node if it is new.
    pub fn add_node(&mut self, id: NodeId) -> NodeIndex {
        if let Some(&ix) = self.index.get(&id) {
            return ix;
        }
        let ix = self.graph.add_node(CalcNode::new(id.clone()));
        self.index.insert(id, ix);
        ix
    }

    /// Adds a calculation edge. Re-asserting an edge with the same weight is a
    /// no-op and a +1/-1 pair resolves to -1.0; any other disagreement is an error.
    pub fn add_edge(&mut self, parent: NodeId, child: NodeId, edge: CalcEdge) -> Result<(), ExplosionError> {
        let p = self.add_node(parent.clone());
        let c = self.add_node(child.clone());
        let Some(ex) = self.graph.find_edge(p, c) else {
            self.graph.add_edge(p, c, edge);
            return Ok(());
        };
        let first = self.graph[ex].weight;
        if first == edge.weight {
            return Ok(());
        }
        if first * edge.weight == -1.0 {
            debug!(
                "Edge {} -> {} asserted with weights {} and {}; using -1.0.",
                parent, child, first, edge.weight
            );
            self.graph[ex].weight = -1.0;
            return Ok(());
        }
        Err(ExplosionError::WeightConflict { parent, child, first, second: edge.weight })
    }

    /// Inserts or overwrites the edge `parent -> child`.
    pub(crate) fn set_edge(&mut self, parent: NodeId, child: NodeId, edge: CalcEdge) {
        let p = self.add_node(parent);
        let c = self.add_node(child);
        self.graph.update_edge(p, c, edge);
    }

    pub(crate) fn remove_node(&mut self, id: &NodeId) -> Option<CalcNode> {
        let ix = self.index.remove(id)?;
        self.graph.remove_node(ix)
    }

    pub(crate) fn node_mut(&mut self, id: &NodeId) -> Option<&mut CalcNode> {
        let ix = *self.index.get(id)?;
        self.graph.node_weight_mut(ix)
    }

    fn set_original_factoid(&mut self, id: &NodeId, original: Option<&str>) -> Result<(), ExplosionError> {
        let Some(original) = original else { return Ok(()) };
        let Some(node) = self.node_mut(id) else { return Ok(()) };
        if let Some(first) = &node.xbrl_factoid_original {
            if first != original {
                return Err(ExplosionError::InconsistentOriginalFactoid {
                    node: id.clone(),
                    first: first.clone(),
                    second: original.to_string(),
                });
            }
            return Ok(());
        }
        node.xbrl_factoid_original = Some(original.to_string());
        Ok(())
    }

    /// The subgraph induced by `keep`, with node and edge attributes carried over.
    pub fn subgraph(&self, keep: &BTreeSet<NodeId>) -> Self {
        let mut sub = Self::new();
        for id in keep {
            if let Some(node) = self.node(id) {
                let ix = sub.add_node(id.clone());
                sub.graph[ix] = node.clone();
            }
        }
        for (parent, child, edge) in self.edges() {
            if keep.contains(&parent) && keep.contains(&child) {
                sub.set_edge(parent, child, edge.clone());
            }
        }
        sub
    }

    // --- Accessors ---
    pub fn node_count(&self) -> usize { self.graph.node_count() }
    pub fn edge_count(&self) -> usize { self.graph.edge_count() }
    pub fn contains(&self, id: &NodeId) -> bool { self.index.contains_key(id) }
    pub(crate) fn index_of(&self, id: &NodeId) -> Option<NodeIndex> { self.index.get(id).copied() }

    pub fn node(&self, id: &NodeId) -> Option<&CalcNode> {
        self.graph.node_weight(self.index_of(id)?)
    }

    /// Every node, in `NodeId` order.
    pub fn node_ids(&self) -> BTreeSet<NodeId> {
        self.index.keys().cloned().collect()
    }

    /// Every edge as `(parent, child, edge)`, ordered by endpoints.
    pub fn edges(&self) -> Vec<(NodeId, NodeId, &CalcEdge)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_indices()
            .filter_map(|ex| {
                let (s, t) = self.graph.edge_endpoints(ex)?;
                Some((self.graph[s].id.clone(), self.graph[t].id.clone(), &self.graph[ex]))
            })
            .collect();
        edges.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        edges
    }

    pub fn edge(&self, parent: &NodeId, child: &NodeId) -> Option<&CalcEdge> {
        let ex = self.graph.find_edge(self.index_of(parent)?, self.index_of(child)?)?;
        self.graph.edge_weight(ex)
    }

    pub fn edge_weight(&self, parent: &NodeId, child: &NodeId) -> Option<f64> {
        self.edge(parent, child).map(|e| e.weight)
    }

    fn neighbors(&self, id: &NodeId, dir: Direction) -> Vec<NodeId> {
        let Some(ix) = self.index_of(id) else { return Vec::new() };
        let mut out: Vec<NodeId> = self
            .graph
            .neighbors_directed(ix, dir)
            .map(|n| self.graph[n].id.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Factoids whose calculations reference `id`.
    pub fn parents(&self, id: &NodeId) -> Vec<NodeId> { self.neighbors(id, Direction::Incoming) }
    /// Components of the calculation of `id`.
    pub fn children(&self, id: &NodeId) -> Vec<NodeId> { self.neighbors(id, Direction::Outgoing) }
    pub fn in_degree(&self, id: &NodeId) -> usize { self.parents(id).len() }
    pub fn out_degree(&self, id: &NodeId) -> usize { self.children(id).len() }
}
