//! explode.rs
//! Explodes a group of nested tables into their leaf-level factoids.
//!
//! An [`Exploder`] is built once per group of tables. It merges the metadata
//! of the tables, builds the calculation forest, and then turns the tables'
//! data into a reconciled dataset and a leaf-level dataset with [`Exploder::boom`].

use crate::analysis::{leafy_data, CalculationForest, LeafyRecord};
use crate::compute::{ExplodedRecord, ExplosionError, InterTableReconciler, ReconciliationReport, TableFrame};
use crate::config::ExplosionConfig;
use crate::store::{Datum, ExplodedMetadata, MetadataExploder, TagTable, XbrlMetadataRow};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

pub const XBRL_FACTOID: &str = "xbrl_factoid";
pub const TABLE_NAME: &str = "table_name";

/// The outputs of one explosion.
#[derive(Debug, Clone, PartialEq)]
pub struct Explosion {
    /// Every record of the group, with calculated values and correction records.
    pub reconciled: Vec<ExplodedRecord>,
    /// Records of leaf factoids, scaled by the weight of their leaf.
    pub leafy: Vec<LeafyRecord>,
    pub report: ReconciliationReport,
}

#[derive(Debug, Clone)]
pub struct Exploder {
    config: ExplosionConfig,
    meta: ExplodedMetadata,
    forest: CalculationForest,
}

impl Exploder {
    pub fn new(
        config: ExplosionConfig,
        metadata: &BTreeMap<String, Vec<XbrlMetadataRow>>,
        tags: &TagTable,
    ) -> Result<Self, ExplosionError> {
        config.validate()?;
        let meta = MetadataExploder::new(config.table_names()).boom(metadata)?;
        let forest = CalculationForest::build(&meta, tags, &config)?;
        Ok(Self { config, meta, forest })
    }

    pub fn config(&self) -> &ExplosionConfig { &self.config }
    pub fn metadata(&self) -> &ExplodedMetadata { &self.meta }
    pub fn forest(&self) -> &CalculationForest { &self.forest }

    /// The value column shared by every table of the group.
    pub fn value_col(&self) -> Result<&str, ExplosionError> {
        let cols: BTreeSet<&str> = self.config.tables.iter().map(|t| t.column_to_check.as_str()).collect();
        match cols.iter().next() {
            Some(col) if cols.len() == 1 => Ok(*col),
            _ => Err(ExplosionError::ValueColumnMismatch(cols.iter().map(|c| c.to_string()).collect())),
        }
    }

    /// Primary key of the exploded data: every table's primary key without its
    /// factoid column, then `xbrl_factoid` and `table_name`.
    pub fn exploded_pks(&self) -> Vec<String> {
        let mut pks = self.key_columns();
        pks.push(XBRL_FACTOID.to_string());
        pks.push(TABLE_NAME.to_string());
        pks
    }

    /// The secondary partition columns of the tables.
    pub fn other_dimensions(&self) -> Vec<String> {
        let mut dims: Vec<String> = Vec::new();
        for col in self.config.tables.iter().filter_map(|t| t.subtotal_column.as_ref()) {
            if !col.is_empty() && !dims.contains(col) {
                dims.push(col.clone());
            }
        }
        dims
    }

    fn key_columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = Vec::new();
        for table in &self.config.tables {
            for col in table.primary_key.iter().filter(|c| **c != table.xbrl_factoid_name) {
                if !cols.contains(col) {
                    cols.push(col.clone());
                }
            }
        }
        cols
    }

    /// Concatenates the tables into exploded records annotated with their metadata.
    pub fn initial_explosion_concatenation(&self, tables: &[TableFrame]) -> Result<Vec<ExplodedRecord>, ExplosionError> {
        let key_columns = self.key_columns();
        let mut records = Vec::with_capacity(tables.iter().map(|t| t.rows.len()).sum());
        for frame in tables {
            let params = self
                .config
                .table(&frame.table_name)
                .ok_or_else(|| ExplosionError::UnknownTable { table: frame.table_name.clone() })?;

            for row in &frame.rows {
                let factoid = row
                    .keys
                    .get(&params.xbrl_factoid_name)
                    .and_then(Datum::as_text)
                    .ok_or_else(|| ExplosionError::MissingFactoid {
                        table: frame.table_name.clone(),
                        column: params.xbrl_factoid_name.clone(),
                    })?;

                let mut keys: BTreeMap<String, Datum> =
                    row.keys.iter().filter(|(k, _)| **k != params.xbrl_factoid_name).map(|(k, v)| (k.clone(), v.clone())).collect();
                for col in &key_columns {
                    keys.entry(col.clone()).or_default();
                }

                let mut record = ExplodedRecord {
                    table_name: frame.table_name.clone(),
                    xbrl_factoid: factoid.to_string(),
                    keys,
                    values: row.values.clone(),
                    ..Default::default()
                };
                if let Some(meta) = self.meta.get(&record.node_id()) {
                    record.row_type = Some(meta.row_type());
                    record.intra_table_calc_flag = Some(meta.intra_table_calc_flag);
                    record.xbrl_factoid_original = meta.xbrl_factoid_original.clone();
                }
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Reconciles the tables' inter-table calculations and explodes the
    /// result into leaf-level records.
    pub fn boom(&self, tables: &[TableFrame]) -> Result<Explosion, ExplosionError> {
        let value_col = self.value_col()?;
        info!("{}: Exploding {} tables.", self.config.root_table, tables.len());

        let records = self.initial_explosion_concatenation(tables)?;
        let reconciler = InterTableReconciler::new(
            self.config.root_table.clone(),
            value_col,
            self.key_columns(),
            self.other_dimensions(),
            self.config.isclose,
        );
        let records = reconciler.generate_intertable_calculations(&self.meta, records)?;
        let (mut reconciled, report) =
            reconciler.reconcile_intertable_calculations(records, self.config.calculation_tolerance)?;
        if self.config.remove_inter_table_duplicates {
            reconciled = self.remove_inter_table_calc_duplication(reconciled);
        }

        let leafy = leafy_data(&reconciled, &self.forest.leafy_meta);
        debug!(
            "{}: {} reconciled records, {} leaf records.",
            self.config.root_table,
            reconciled.len(),
            leafy.len()
        );
        Ok(Explosion { reconciled, leafy, report })
    }

    /// Drops the records of every component that was removed from a calculation
    /// because it is reported outside the explosion.
    pub fn remove_inter_table_calc_duplication(&self, records: Vec<ExplodedRecord>) -> Vec<ExplodedRecord> {
        let removed = &self.meta.removed_components;
        if removed.is_empty() {
            return records;
        }
        info!(
            "{}: Removing intra-table calculation components in inter-table calculations ({:?}).",
            self.config.root_table, removed
        );
        let before = records.len();
        let kept: Vec<ExplodedRecord> = records.into_iter().filter(|r| !removed.contains(&r.xbrl_factoid)).collect();
        debug!("{}: Removed {} records.", self.config.root_table, before - kept.len());
        kept
    }
}

/// Runs independent explosions in parallel. Results come back in input order.
pub fn boom_all(groups: &[(Exploder, Vec<TableFrame>)]) -> Vec<Result<Explosion, ExplosionError>> {
    groups.par_iter().map(|(exploder, tables)| exploder.boom(tables)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::TableRow;
    use crate::config::TableParams;
    use crate::store::{NodeId, RowType};
    use test_log::test;

    const VALUE: &str = "ending_balance";

    fn params(table: &str, factoid_col: &str, value_col: &str) -> TableParams {
        TableParams {
            table_name: table.into(),
            xbrl_factoid_name: factoid_col.into(),
            column_to_check: value_col.into(),
            subtotal_column: None,
            primary_key: vec!["utility_id".into(), "report_year".into(), factoid_col.into()],
        }
    }

    fn config() -> ExplosionConfig {
        ExplosionConfig::new("plant", vec![params("plant", "row_name", VALUE), params("detail", "line_item", VALUE)])
    }

    fn meta_row(factoid: &str, row_type: RowType, calculations: &str, intra: bool) -> XbrlMetadataRow {
        XbrlMetadataRow {
            xbrl_factoid: factoid.into(),
            xbrl_factoid_original: Some(factoid.into()),
            calculations: calculations.into(),
            row_type_xbrl: row_type,
            intra_table_calc_flag: intra,
        }
    }

    fn metadata() -> BTreeMap<String, Vec<XbrlMetadataRow>> {
        let total = r#"[
            {"name": "a", "weight": 1.0, "source_tables": ["detail"]},
            {"name": "b", "weight": -1.0, "source_tables": ["detail"]}
        ]"#;
        BTreeMap::from([
            ("plant".to_string(), vec![meta_row("total", RowType::CalculatedValue, total, false)]),
            (
                "detail".to_string(),
                vec![meta_row("a", RowType::ReportedValue, "", true), meta_row("b", RowType::ReportedValue, "", true)],
            ),
        ])
    }

    fn row(factoid_col: &str, factoid: &str, utility_id: i64, value: f64) -> TableRow {
        TableRow::new()
            .key(factoid_col, factoid)
            .key("utility_id", utility_id)
            .key("report_year", 2021i64)
            .value(VALUE, Some(value))
    }

    /// Four utilities; only utility 2 can disagree with its total.
    fn tables(a_for_utility_2: f64) -> Vec<TableFrame> {
        let utilities = 1..=4i64;
        let plant = utilities.clone().map(|u| row("row_name", "total", u, 100.0)).collect();
        let detail = utilities
            .flat_map(|u| {
                let a = if u == 2 { a_for_utility_2 } else { 120.0 };
                [row("line_item", "a", u, a), row("line_item", "b", u, 20.0)]
            })
            .collect();
        vec![TableFrame::new("plant", plant), TableFrame::new("detail", detail)]
    }

    #[test]
    fn test_keys_and_dimensions() {
        let exploder = Exploder::new(config(), &metadata(), &TagTable::new()).unwrap();
        assert_eq!(exploder.value_col().unwrap(), VALUE);
        assert_eq!(exploder.exploded_pks(), vec!["utility_id", "report_year", "xbrl_factoid", "table_name"]);
        assert!(exploder.other_dimensions().is_empty());
    }

    #[test]
    fn test_value_columns_must_agree() {
        let cfg = ExplosionConfig::new(
            "plant",
            vec![params("plant", "row_name", VALUE), params("detail", "line_item", "starting_balance")],
        );
        let exploder = Exploder::new(cfg, &metadata(), &TagTable::new()).unwrap();
        assert!(matches!(exploder.value_col(), Err(ExplosionError::ValueColumnMismatch(cols)) if cols.len() == 2));
        assert!(exploder.boom(&tables(120.0)).is_err());
    }

    #[test]
    fn test_concatenation_annotates_records() {
        let exploder = Exploder::new(config(), &metadata(), &TagTable::new()).unwrap();
        let records = exploder.initial_explosion_concatenation(&tables(120.0)).unwrap();
        assert_eq!(records.len(), 12);
        assert_eq!(records[0].node_id(), NodeId::new("plant", "total"));
        assert_eq!(records[0].row_type, Some(RowType::CalculatedValue));
        assert_eq!(records[0].intra_table_calc_flag, Some(false));
        assert!(!records[0].keys.contains_key("row_name"));
        assert_eq!(records[4].node_id(), NodeId::new("detail", "a"));

        let unknown = [TableFrame::new("elsewhere", vec![])];
        assert!(matches!(
            exploder.initial_explosion_concatenation(&unknown),
            Err(ExplosionError::UnknownTable { .. })
        ));
        let nameless = [TableFrame::new("plant", vec![TableRow::new().key("row_name", 3i64)])];
        assert!(matches!(
            exploder.initial_explosion_concatenation(&nameless),
            Err(ExplosionError::MissingFactoid { .. })
        ));
    }

    #[test]
    fn test_boom_reconciles_and_explodes() {
        let exploder = Exploder::new(config().with_tolerance(0.25), &metadata(), &TagTable::new()).unwrap();
        let explosion = exploder.boom(&tables(117.0)).unwrap();

        assert_eq!(explosion.report.compared, 4);
        assert_eq!(explosion.report.corrections, 1);
        let correction = explosion.reconciled.last().unwrap();
        assert_eq!(correction.node_id(), NodeId::new("plant", "total_correction"));
        assert_eq!(correction.value(VALUE), Some(3.0));
        assert_eq!(correction.keys.get("utility_id"), Some(&Datum::Int(2)));

        assert_eq!(explosion.leafy.len(), 8);
        let b: Vec<Option<f64>> = explosion
            .leafy
            .iter()
            .filter(|l| l.record.xbrl_factoid == "b")
            .map(|l| l.record.value(VALUE))
            .collect();
        assert_eq!(b, vec![Some(-20.0); 4]);
        assert!(explosion.leafy.iter().all(|l| l.root == NodeId::new("plant", "total")));
    }

    #[test]
    fn test_boom_all_keeps_order() {
        let strict = Exploder::new(config(), &metadata(), &TagTable::new()).unwrap();
        let lenient = Exploder::new(config().with_tolerance(0.25), &metadata(), &TagTable::new()).unwrap();
        let results = boom_all(&[(strict, tables(117.0)), (lenient.clone(), tables(117.0)), (lenient, tables(120.0))]);

        assert!(matches!(results[0], Err(ExplosionError::ToleranceExceeded { .. })));
        assert_eq!(results[1].as_ref().unwrap().report.corrections, 1);
        assert_eq!(results[2].as_ref().unwrap().report.corrections, 0);
    }

    #[test]
    fn test_components_outside_the_explosion_can_be_removed() {
        let mut meta = metadata();
        let outside = r#"[{"name": "x", "weight": 1.0, "source_tables": ["elsewhere"]}]"#;
        meta.get_mut("plant").unwrap().push(meta_row("other", RowType::CalculatedValue, outside, false));
        let mut data = tables(120.0);
        data[1].rows.push(row("line_item", "x", 1, 5.0));
        let has_x = |e: &Explosion| e.reconciled.iter().any(|r| r.xbrl_factoid == "x");

        let keep = Exploder::new(config(), &meta, &TagTable::new()).unwrap();
        assert_eq!(keep.metadata().removed_components.iter().collect::<Vec<_>>(), vec!["x"]);
        assert!(has_x(&keep.boom(&data).unwrap()));

        let mut cfg = config();
        cfg.remove_inter_table_duplicates = true;
        let dedup = Exploder::new(cfg, &meta, &TagTable::new()).unwrap();
        let explosion = dedup.boom(&data).unwrap();
        assert!(!has_x(&explosion));
        assert_eq!(explosion.reconciled.len(), 12);
    }
}
