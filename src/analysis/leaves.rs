//! Propagates weights and tags from the roots of a forest down to its leaves.

use super::topology::{descendants, leaves, roots};
use crate::compute::{ExplodedRecord, ExplosionError};
use crate::config::OnConflict;
use crate::graph::CalculationGraph;
use crate::store::{CalculationComponent, NodeId, Tags};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// A leaf of the forest, annotated with the root it rolls up into.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafRecord {
    pub leaf: NodeId,
    pub root: NodeId,
    /// Product of the edge weights on the path from the root down to the leaf.
    pub weight: f64,
    /// Tags of the leaf and of every node above it.
    pub tags: Tags,
    pub xbrl_factoid_original: Option<String>,
}

impl LeafRecord {
    pub fn root_table(&self) -> &str { &self.root.source_table }
    pub fn root_factoid(&self) -> &str { &self.root.xbrl_factoid }
}

/// One data record of a leaf, with its value columns scaled by the leaf weight.
/// A leaf without data gets one record with no values.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafyRecord {
    pub record: ExplodedRecord,
    pub root: NodeId,
    pub weight: f64,
    pub tags: Tags,
}

/// Merges `tags` into `into`. A key already present with a different value is a
/// conflict: an error, or under [`OnConflict::Log`] the incoming value wins.
pub fn merge_tags(node: &NodeId, into: &mut Tags, tags: &Tags, policy: OnConflict) -> Result<(), ExplosionError> {
    for (tag, value) in tags {
        match into.get(tag) {
            Some(first) if first != value => match policy {
                OnConflict::Error => {
                    return Err(ExplosionError::TagConflict {
                        node: node.clone(),
                        tag: tag.clone(),
                        first: first.clone(),
                        second: value.clone(),
                    })
                }
                OnConflict::Log => {
                    warn!("{} inherits {}={} over {}.", node, tag, value, first);
                }
            },
            _ => {}
        }
        into.insert(tag.clone(), value.clone());
    }
    Ok(())
}

/// One record per leaf of `forest`, in leaf order.
///
/// Each leaf is assigned the first root (in `NodeId` order) whose calculation
/// reaches it. Tags are merged from the root down, so under
/// [`OnConflict::Log`] the value nearest the leaf wins.
pub fn leafy_meta(forest: &CalculationGraph, on_tag_conflict: OnConflict) -> Result<Vec<LeafRecord>, ExplosionError> {
    let mut reach: Vec<(NodeId, BTreeSet<NodeId>)> = Vec::new();
    for root in roots(forest) {
        let below = descendants(forest, std::slice::from_ref(&root));
        reach.push((root, below));
    }

    let mut records = Vec::new();
    for leaf in leaves(forest) {
        let mut owners = reach.iter().filter(|(_, below)| below.contains(&leaf));
        let Some((root, below)) = owners.next() else {
            warn!("Leaf {} is not reachable from any root.", leaf);
            continue;
        };
        let others: Vec<&NodeId> = owners.map(|(r, _)| r).collect();
        if !others.is_empty() {
            warn!("Leaf {} is reached from several roots; using {} over {:?}.", leaf, root, others);
        }

        let (path, weight) = path_to_root(forest, &leaf, root, below);
        let mut tags = Tags::new();
        for node in path.iter().rev() {
            if let Some(n) = forest.node(node) {
                merge_tags(&leaf, &mut tags, &n.tags, on_tag_conflict)?;
            }
        }
        records.push(LeafRecord {
            xbrl_factoid_original: forest.node(&leaf).and_then(|n| n.xbrl_factoid_original.clone()),
            leaf,
            root: root.clone(),
            weight,
            tags,
        });
    }
    debug!("Found {} leaves below {} roots.", records.len(), reach.len());
    Ok(records)
}

/// Walks up from `leaf` to `root` through parents below `root`, returning the
/// nodes visited (leaf first) and the product of the edge weights crossed.
fn path_to_root(
    forest: &CalculationGraph,
    leaf: &NodeId,
    root: &NodeId,
    below: &BTreeSet<NodeId>,
) -> (Vec<NodeId>, f64) {
    let mut path = vec![leaf.clone()];
    let mut weight = 1.0;
    let mut current = leaf.clone();
    while current != *root {
        let Some(parent) = forest.parents(&current).into_iter().find(|p| below.contains(p) && !path.contains(p))
        else {
            break;
        };
        weight *= forest.edge_weight(&parent, &current).unwrap_or(1.0);
        path.push(parent.clone());
        current = parent;
    }
    (path, weight)
}

/// Left-joins data records onto the leaves, in leaf order, scaling every value
/// column by the leaf weight. Records of non-leaf factoids are dropped and a
/// leaf without records yields a single record with null values.
pub fn leafy_data(records: &[ExplodedRecord], meta: &[LeafRecord]) -> Vec<LeafyRecord> {
    let mut by_node: HashMap<NodeId, Vec<&ExplodedRecord>> = HashMap::new();
    for record in records {
        by_node.entry(record.node_id()).or_default().push(record);
    }

    let mut empty = 0;
    let mut out = Vec::with_capacity(records.len());
    for leaf in meta {
        let leafy = |record: ExplodedRecord| LeafyRecord {
            record,
            root: leaf.root.clone(),
            weight: leaf.weight,
            tags: leaf.tags.clone(),
        };
        let Some(matched) = by_node.get(&leaf.leaf) else {
            empty += 1;
            out.push(leafy(ExplodedRecord {
                table_name: leaf.leaf.source_table.clone(),
                xbrl_factoid: leaf.leaf.xbrl_factoid.clone(),
                xbrl_factoid_original: leaf.xbrl_factoid_original.clone(),
                ..Default::default()
            }));
            continue;
        };
        for record in matched {
            let mut scaled = (*record).clone();
            for value in scaled.values.values_mut() {
                *value = value.map(|v| v * leaf.weight);
            }
            out.push(leafy(scaled));
        }
    }
    if empty > 0 {
        debug!("{} of {} leaves have no reported data.", empty, meta.len());
    }
    out
}

/// The flattened calculation of every root: one component per leaf, weighted by
/// the leaf's propagated weight.
pub fn root_calculations(meta: &[LeafRecord]) -> BTreeMap<NodeId, Vec<CalculationComponent>> {
    let mut calcs: BTreeMap<NodeId, Vec<CalculationComponent>> = BTreeMap::new();
    for leaf in meta {
        calcs.entry(leaf.root.clone()).or_default().push(CalculationComponent::new(
            leaf.leaf.xbrl_factoid.clone(),
            leaf.weight,
            leaf.leaf.source_table.clone(),
        ));
    }
    calcs
}
