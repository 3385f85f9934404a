//! forest.rs
//! The full graph, the seeded graph, the pruned forest and its leaves, built once in order.

use super::leaves::{leafy_meta, root_calculations, LeafRecord};
use super::topology::{self, Passthrough};
use crate::compute::ExplosionError;
use crate::config::ExplosionConfig;
use crate::graph::CalculationGraph;
use crate::store::{CalculationComponent, ExplodedMetadata, NodeId, TagTable};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct CalculationForest {
    /// Every calculation of the exploded metadata.
    pub full: CalculationGraph,
    /// `full` restricted to the seeds and their descendants.
    pub seeded: CalculationGraph,
    /// `seeded` with its passthrough nodes elided.
    pub forest: CalculationGraph,
    pub seeds: Vec<NodeId>,
    pub leafy_meta: Vec<LeafRecord>,
    orphans: BTreeSet<NodeId>,
}

impl CalculationForest {
    pub fn build(
        meta: &ExplodedMetadata,
        tags: &TagTable,
        config: &ExplosionConfig,
    ) -> Result<Self, ExplosionError> {
        // 1. Seeds must name factoids of the explosion
        let unknown: Vec<NodeId> = config.seeds.iter().filter(|s| !meta.contains(s)).cloned().collect();
        if !unknown.is_empty() {
            return Err(ExplosionError::UnknownSeed(unknown));
        }

        // 2. Full graph
        let full = CalculationGraph::from_metadata(meta.rows(), tags, &config.excluded_nodes)?;
        topology::check_acyclic(&full, config.on_cycle)?;

        // 3. Seeded graph and forest
        let seeded = topology::seeded_digraph(&full, &config.seeds);
        let forest = topology::prune_passthroughs(&seeded, config.on_tag_conflict)?;
        if !topology::is_forest(&forest) {
            error!(
                "Calculations in exploded metadata do not form a forest. Stepchildren: {:?}",
                topology::stepchildren(&forest)
            );
        }

        // 4. Leaves
        let leafy_meta = leafy_meta(&forest, config.on_tag_conflict)?;

        let graph_nodes = full.node_ids();
        let orphans = meta.node_ids().filter(|n| !graph_nodes.contains(n)).collect();

        let built = Self {
            full,
            seeded,
            forest,
            seeds: config.seeds.clone(),
            leafy_meta,
            orphans,
        };
        built.log_stages();
        Ok(built)
    }

    fn log_stages(&self) {
        for (stage, graph) in [("full", &self.full), ("seeded", &self.seeded), ("forest", &self.forest)] {
            debug!(
                "{} digraph: {} nodes, {} edges, {} roots, {} leaves, {} weakly connected components.",
                stage,
                graph.node_count(),
                graph.edge_count(),
                topology::roots(graph).len(),
                topology::leaves(graph).len(),
                topology::weak_component_count(graph)
            );
        }
        if !self.orphans.is_empty() {
            debug!("{} metadata nodes take part in no calculation.", self.orphans.len());
        }
    }

    pub fn full_digraph_roots(&self) -> BTreeSet<NodeId> { topology::roots(&self.full) }
    pub fn full_digraph_leaves(&self) -> BTreeSet<NodeId> { topology::leaves(&self.full) }
    pub fn seeded_digraph_roots(&self) -> BTreeSet<NodeId> { topology::roots(&self.seeded) }
    pub fn seeded_digraph_leaves(&self) -> BTreeSet<NodeId> { topology::leaves(&self.seeded) }
    pub fn forest_roots(&self) -> BTreeSet<NodeId> { topology::roots(&self.forest) }
    pub fn forest_leaves(&self) -> BTreeSet<NodeId> { topology::leaves(&self.forest) }

    /// Metadata nodes that appear in no calculation.
    pub fn orphans(&self) -> &BTreeSet<NodeId> { &self.orphans }

    /// Nodes of the full graph that did not make it into the forest.
    pub fn pruned(&self) -> BTreeSet<NodeId> {
        let kept = self.forest.node_ids();
        self.full.node_ids().into_iter().filter(|n| !kept.contains(n)).collect()
    }

    pub fn stepchildren(&self) -> BTreeSet<NodeId> { topology::stepchildren(&self.forest) }
    pub fn stepparents(&self) -> BTreeSet<NodeId> { topology::stepparents(&self.forest) }

    /// Passthrough nodes of the seeded graph, before pruning.
    pub fn passthroughs(&self) -> Vec<Passthrough> { topology::passthroughs(&self.seeded) }

    pub fn is_forest(&self) -> bool { topology::is_forest(&self.forest) }

    pub fn root_calculations(&self) -> BTreeMap<NodeId, Vec<CalculationComponent>> {
        root_calculations(&self.leafy_meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OnConflict, TableParams};
    use crate::store::{Calculation, MetadataRow};
    use test_log::test;

    fn row(factoid: &str, comps: &[(&str, f64)]) -> MetadataRow {
        MetadataRow {
            table_name: "t".into(),
            xbrl_factoid: factoid.into(),
            xbrl_factoid_original: Some(factoid.into()),
            calculation: if comps.is_empty() {
                Calculation::Reported
            } else {
                Calculation::Calculated(
                    comps.iter().map(|&(c, w)| CalculationComponent::new(c, w, "t")).collect(),
                )
            },
            intra_table_calc_flag: true,
            in_explosion: true,
        }
    }

    fn n(f: &str) -> NodeId { NodeId::new("t", f) }

    fn set(fs: &[&str]) -> BTreeSet<NodeId> { fs.iter().map(|f| n(f)).collect() }

    fn config() -> ExplosionConfig {
        ExplosionConfig::new(
            "t",
            vec![TableParams {
                table_name: "t".into(),
                xbrl_factoid_name: "row_name".into(),
                column_to_check: "ending_balance".into(),
                subtotal_column: None,
                primary_key: vec!["row_name".into()],
            }],
        )
    }

    fn metadata() -> ExplodedMetadata {
        ExplodedMetadata::new(vec![
            row("total", &[("sub", 1.0), ("other", -1.0), ("total_correction", 1.0)]),
            row("sub", &[("leaf", 1.0), ("leaf_correction", 1.0)]),
            row("leaf", &[]),
            row("leaf_correction", &[]),
            row("other", &[]),
            row("total_correction", &[]),
            row("unrelated", &[]),
            row("second", &[("third", 1.0)]),
            row("third", &[]),
        ])
        .unwrap()
    }

    #[test]
    fn test_build_prunes_and_collects_leaves() {
        let forest = CalculationForest::build(&metadata(), &TagTable::new(), &config()).unwrap();
        assert!(forest.is_forest());
        assert_eq!(forest.forest_roots(), set(&["second", "total"]));
        assert_eq!(forest.orphans(), &set(&["unrelated"]));
        assert_eq!(forest.pruned(), set(&["leaf_correction", "sub"]));
        assert_eq!(forest.passthroughs().len(), 1);
        assert_eq!(forest.forest.edge_weight(&n("total"), &n("leaf")), Some(1.0));

        let leaves: Vec<(NodeId, f64)> = forest.leafy_meta.iter().map(|m| (m.leaf.clone(), m.weight)).collect();
        assert_eq!(leaves, vec![(n("leaf"), 1.0), (n("other"), -1.0), (n("third"), 1.0), (n("total_correction"), 1.0)]);
    }

    #[test]
    fn test_seeds_restrict_the_forest() {
        let cfg = config().with_seeds(vec![n("second")]);
        let forest = CalculationForest::build(&metadata(), &TagTable::new(), &cfg).unwrap();
        assert_eq!(forest.seeded.node_ids(), set(&["second", "third"]));
        assert_eq!(forest.full_digraph_roots().len(), 2);
        assert_eq!(forest.root_calculations().len(), 1);
    }

    #[test]
    fn test_unknown_seeds_are_rejected() {
        let cfg = config().with_seeds(vec![n("nowhere")]);
        let err = CalculationForest::build(&metadata(), &TagTable::new(), &cfg).unwrap_err();
        assert!(matches!(err, ExplosionError::UnknownSeed(s) if s == vec![n("nowhere")]));
    }

    #[test]
    fn test_cycles_abort_unless_logged() {
        let meta = ExplodedMetadata::new(vec![row("a", &[("b", 1.0)]), row("b", &[("a", 1.0)])]).unwrap();
        let err = CalculationForest::build(&meta, &TagTable::new(), &config()).unwrap_err();
        assert!(matches!(err, ExplosionError::CycleDetected { .. }));

        let mut cfg = config();
        cfg.on_cycle = OnConflict::Log;
        let forest = CalculationForest::build(&meta, &TagTable::new(), &cfg).unwrap();
        assert!(!forest.is_forest());
    }

    #[test]
    fn test_stepchildren_are_reported_not_fatal() {
        let meta = ExplodedMetadata::new(vec![
            row("a", &[("shared", 1.0)]),
            row("b", &[("shared", 1.0)]),
            row("shared", &[]),
        ])
        .unwrap();
        let forest = CalculationForest::build(&meta, &TagTable::new(), &config()).unwrap();
        assert!(!forest.is_forest());
        assert_eq!(forest.stepchildren(), set(&["shared"]));
        assert_eq!(forest.stepparents(), set(&["a", "b"]));
        assert_eq!(forest.leafy_meta.len(), 1);
        assert_eq!(forest.leafy_meta[0].root, n("a"));
    }
}
