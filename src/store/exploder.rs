//! Combines the metadata of a set of inter-related, nested tables.

use super::calculation::Calculation;
use super::components::{calculation_component_table, in_explosion_tables};
use super::registry::{ExplodedMetadata, MetadataRow, XbrlMetadataRow};
use super::types::NodeId;
use crate::compute::ExplosionError;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

pub struct MetadataExploder {
    table_names: Vec<String>,
}

impl MetadataExploder {
    pub fn new<I, S>(table_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { table_names: table_names.into_iter().map(Into::into).collect() }
    }

    /// Concatenates the metadata of every table in the explosion, tagging each row
    /// with its table, and demotes calculations that reach outside the explosion.
    pub fn boom(
        &self,
        metadata: &BTreeMap<String, Vec<XbrlMetadataRow>>,
    ) -> Result<ExplodedMetadata, ExplosionError> {
        let mut rows = Vec::new();
        for table_name in &self.table_names {
            let tbl_meta = metadata
                .get(table_name)
                .ok_or_else(|| ExplosionError::MissingTableMetadata(table_name.clone()))?;
            for raw in tbl_meta {
                rows.push(MetadataRow::from_xbrl(table_name, raw)?);
            }
        }
        let (rows, removed) = self.redefine_calculations_with_components_out_of_explosion(rows);
        let mut exploded = ExplodedMetadata::new(rows)?;
        exploded.removed_components = removed;
        Ok(exploded)
    }

    /// Any factoid with at least one calculation component reported outside of the
    /// explosion becomes a reported value with no calculation, so that no value is
    /// invented for it. Returns the names of the components dropped this way.
    pub fn redefine_calculations_with_components_out_of_explosion(
        &self,
        mut rows: Vec<MetadataRow>,
    ) -> (Vec<MetadataRow>, BTreeSet<String>) {
        let explosion_tables: BTreeSet<String> = self.table_names.iter().cloned().collect();

        let mut not_in_explosion: BTreeSet<NodeId> = BTreeSet::new();
        let mut removed: BTreeSet<String> = BTreeSet::new();
        for comp in calculation_component_table(&rows) {
            if !in_explosion_tables(&comp.component.source_tables, &explosion_tables) {
                not_in_explosion.insert(comp.parent());
                removed.insert(comp.component.name.clone());
            }
        }

        if !not_in_explosion.is_empty() {
            info!(
                "Redefining {} calculations with components outside of the explosion as reported values.",
                not_in_explosion.len()
            );
        }
        for row in rows.iter_mut() {
            let node = row.node_id();
            if not_in_explosion.contains(&node) {
                debug!("{} has calculation components outside of the explosion.", node);
                row.in_explosion = false;
                row.calculation = Calculation::Reported;
            }
        }
        (rows, removed)
    }
}
