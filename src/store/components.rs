//! Flattens declared calculations into a table of calculation components.

use super::calculation::CalculationComponent;
use super::registry::MetadataRow;
use super::types::{NodeId, RowType};
use smallvec::smallvec;
use std::collections::BTreeSet;
use tracing::debug;

/// A calculation component joined back onto the metadata of its parent factoid.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRow {
    pub table_name: String,
    pub xbrl_factoid: String,
    pub component: CalculationComponent,
    pub row_type: RowType,
    pub intra_table_calc_flag: bool,
    pub xbrl_factoid_original: Option<String>,
}

impl ComponentRow {
    pub fn parent(&self) -> NodeId {
        NodeId::new(self.table_name.clone(), self.xbrl_factoid.clone())
    }
}

/// One row per component of every calculation in `rows`, carrying the
/// parent's metadata (minus the calculation itself).
pub fn calculation_component_table<'a, I>(rows: I) -> Vec<ComponentRow>
where
    I: IntoIterator<Item = &'a MetadataRow>,
{
    rows.into_iter()
        .flat_map(|row| {
            row.calculation.components().iter().map(move |component| ComponentRow {
                table_name: row.table_name.clone(),
                xbrl_factoid: row.xbrl_factoid.clone(),
                component: component.clone(),
                row_type: row.row_type(),
                intra_table_calc_flag: row.intra_table_calc_flag,
                xbrl_factoid_original: row.xbrl_factoid_original.clone(),
            })
        })
        .collect()
}

/// Splits components drawn from several source tables into one row per table,
/// so that ambiguous multi-source components are kept rather than rejected.
pub fn explode_source_tables(rows: Vec<ComponentRow>) -> Vec<ComponentRow> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if row.component.has_single_source() {
            out.push(row);
            continue;
        }
        debug!(
            "Component {} of {} has {} source tables {:?}; exploding one row per table.",
            row.component.name,
            row.parent(),
            row.component.source_tables.len(),
            row.component.source_tables
        );
        for table in &row.component.source_tables {
            let mut single = row.clone();
            single.component.source_tables = smallvec![table.clone()];
            out.push(single);
        }
    }
    out
}

/// True when every one of `source_tables` is part of the explosion.
pub fn in_explosion_tables(source_tables: &[String], explosion_tables: &BTreeSet<String>) -> bool {
    source_tables.iter().all(|t| explosion_tables.contains(t))
}
