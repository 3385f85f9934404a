//! Recomputes inter-table calculations from their components and reconciles
//! them with the reported values.

use crate::compute::kernel::{is_close, weighted_sum};
use crate::compute::ledger::{ExplodedRecord, ExplosionError};
use crate::config::IsClose;
use crate::store::{format_keys, CalculationComponent, Datum, ExplodedMetadata, NodeId, RowType};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// The dimension of calculation components that is matched against the `utility_type` column.
pub const UTILITY_TYPE: &str = "utility_type";

/// Outcome of a reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationReport {
    /// Records with both a reported and a calculated value.
    pub compared: usize,
    /// Compared records whose values are not close.
    pub off: usize,
    /// `off / compared`; `None` when nothing could be compared.
    pub off_ratio: Option<f64>,
    /// Correction records appended.
    pub corrections: usize,
}

type FullKey = (NodeId, BTreeMap<String, Datum>);

pub struct InterTableReconciler {
    root_table: String,
    value_col: String,
    /// Primary-key columns other than the table name and the factoid.
    key_columns: Vec<String>,
    other_dimensions: Vec<String>,
    isclose: IsClose,
}

impl InterTableReconciler {
    pub fn new(
        root_table: impl Into<String>,
        value_col: impl Into<String>,
        key_columns: Vec<String>,
        other_dimensions: Vec<String>,
        isclose: IsClose,
    ) -> Self {
        Self {
            root_table: root_table.into(),
            value_col: value_col.into(),
            key_columns,
            other_dimensions,
            isclose,
        }
    }

    /// The one "other dimension" besides `utility_type` that components may be restricted to.
    fn subdimension(&self) -> Result<Option<&str>, ExplosionError> {
        let subdimensions: Vec<&String> = self.other_dimensions.iter().filter(|d| *d != UTILITY_TYPE).collect();
        match subdimensions.as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(one.as_str())),
            many => Err(ExplosionError::MultipleSubdimensions(many.iter().map(|d| d.to_string()).collect())),
        }
    }

    /// Sets `calculated_amount` on every record of a calculated factoid whose
    /// components are not all reported in its own table.
    ///
    /// Component values are weighted and summed per primary key (minus table
    /// and factoid), requiring at least one non-null term. Components only
    /// match data in their `utility_type` or subdimension when every
    /// component of the calculation names one.
    pub fn generate_intertable_calculations(
        &self,
        meta: &ExplodedMetadata,
        mut records: Vec<ExplodedRecord>,
    ) -> Result<Vec<ExplodedRecord>, ExplosionError> {
        let inter_table: Vec<_> = meta.rows().iter().filter(|r| r.is_inter_table_calculation()).collect();
        if inter_table.is_empty() {
            return Ok(records);
        }
        info!(
            "{}: Reconcile inter-table calculations: {:?}.",
            self.root_table,
            inter_table.iter().map(|r| r.xbrl_factoid.as_str()).collect::<Vec<_>>()
        );
        let subdimension = self.subdimension()?;

        // 1. Index the data by full primary key and by factoid
        let mut by_key: HashMap<FullKey, usize> = HashMap::with_capacity(records.len());
        let mut by_node: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            let node = record.node_id();
            let keys = record.key_projection(&self.key_columns);
            if by_key.contains_key(&(node.clone(), keys.clone())) {
                return Err(ExplosionError::DuplicateRecord { node, keys: format_keys(&keys) });
            }
            by_node.entry(node.clone()).or_default().push(i);
            by_key.insert((node, keys), i);
        }

        // 2. Sum the weighted components of each calculation
        let mut calculated: Vec<(usize, Option<f64>)> = Vec::new();
        for row in inter_table {
            let parent = row.node_id();
            debug!("Reconcile calculation for {}", parent);
            let components: Vec<&CalculationComponent> =
                row.calculation.components().iter().filter(|c| !c.is_correction()).collect();
            let match_utility = components.iter().all(|c| c.utility_type.is_some());
            let match_sub = subdimension.filter(|_| components.iter().all(|c| c.subdimension.is_some()));

            let mut groups: BTreeMap<BTreeMap<String, Datum>, Vec<Option<f64>>> = BTreeMap::new();
            for comp in &components {
                for node in comp.nodes() {
                    for &i in by_node.get(&node).into_iter().flatten() {
                        let record = &records[i];
                        if match_utility && !dimension_matches(record, UTILITY_TYPE, comp.utility_type.as_deref()) {
                            continue;
                        }
                        if let Some(sub) = match_sub {
                            if !dimension_matches(record, sub, comp.subdimension.as_deref()) {
                                continue;
                            }
                        }
                        groups
                            .entry(record.key_projection(&self.key_columns))
                            .or_default()
                            .push(record.value(&self.value_col).map(|v| v * comp.weight));
                    }
                }
            }

            for (keys, terms) in groups {
                let amount = weighted_sum(terms, 1);
                let full = (parent.clone(), keys);
                match by_key.get(&full) {
                    Some(&i) => calculated.push((i, amount)),
                    None if amount.is_some() => {
                        return Err(ExplosionError::UnmatchedCalculation { node: parent, keys: format_keys(&full.1) });
                    }
                    None => {}
                }
            }
        }

        // 3. Merge back onto the data
        for (i, amount) in calculated {
            records[i].calculated_amount = amount;
        }
        Ok(records)
    }

    /// Compares calculated and reported values and appends a correction record
    /// for every record that is off, unless the share of records that are off
    /// exceeds `tolerance`.
    pub fn reconcile_intertable_calculations(
        &self,
        mut records: Vec<ExplodedRecord>,
        tolerance: f64,
    ) -> Result<(Vec<ExplodedRecord>, ReconciliationReport), ExplosionError> {
        let mut report = ReconciliationReport::default();
        let mut off = Vec::new();
        for (i, record) in records.iter_mut().enumerate() {
            let reported = record.value(&self.value_col);
            let (Some(rep), Some(calc)) = (reported, record.calculated_amount) else {
                record.abs_diff = None;
                record.rel_diff = None;
                continue;
            };
            let abs_diff = (rep - calc).abs();
            record.abs_diff = Some(abs_diff);
            record.rel_diff = (rep != 0.0).then(|| (abs_diff / rep).abs());
            report.compared += 1;
            if !is_close(Some(calc), Some(rep), self.isclose) {
                off.push(i);
            }
        }
        if report.compared == 0 {
            return Ok((records, report));
        }

        report.off = off.len();
        let off_ratio = report.off as f64 / report.compared as f64;
        report.off_ratio = Some(off_ratio);
        if off_ratio > tolerance {
            return Err(ExplosionError::ToleranceExceeded {
                root_table: self.root_table.clone(),
                off_ratio,
                tolerance,
            });
        }

        if !off.is_empty() {
            info!(
                "{}: has {} ({:.2}%) records whose calculations don't match. Adding correction records to make calculations match reported values.",
                self.root_table,
                off.len(),
                off_ratio * 100.0
            );
            let corrections: Vec<ExplodedRecord> = off.iter().map(|&i| self.correction_for(&records[i])).collect();
            report.corrections = corrections.len();
            records.extend(corrections);
        }
        Ok((records, report))
    }

    fn correction_for(&self, record: &ExplodedRecord) -> ExplodedRecord {
        let residual = record.value(&self.value_col).unwrap_or(0.0) - record.calculated_amount.unwrap_or(0.0);
        let values = record
            .values
            .keys()
            .map(|col| (col.clone(), if *col == self.value_col { Some(residual) } else { None }))
            .collect();
        let node = record.node_id().correction();
        ExplodedRecord {
            table_name: node.source_table,
            xbrl_factoid: node.xbrl_factoid,
            keys: record.keys.clone(),
            values,
            row_type: Some(RowType::Correction),
            intra_table_calc_flag: Some(false),
            xbrl_factoid_original: record.xbrl_factoid_original.clone(),
            calculated_amount: None,
            abs_diff: None,
            rel_diff: None,
            original_factoid: Some(record.xbrl_factoid.clone()),
        }
    }
}

fn dimension_matches(record: &ExplodedRecord, column: &str, wanted: Option<&str>) -> bool {
    record.keys.get(column).and_then(Datum::as_text) == wanted
}
