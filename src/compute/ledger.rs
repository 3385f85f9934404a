//! ledger.rs
//! Row-level data flowing through an explosion, and the error type of the engine.

use crate::store::{Datum, NodeId, RowType};
use std::collections::BTreeMap;

pub use self::error::ExplosionError;
mod error {
    use crate::store::NodeId;
    use crate::validation::ValidationError;
    use std::collections::BTreeSet;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum ExplosionError {
        #[error("Could not parse calculations of '{node}': {source}")]
        InvalidCalculation { node: NodeId, source: serde_json::Error },
        #[error("No XBRL metadata supplied for table '{0}'")]
        MissingTableMetadata(String),
        #[error("Exploded metadata has a non-unique index value: {0}")]
        DuplicateMetadata(NodeId),
        #[error("Node '{0}' is not in the exploded metadata")]
        UnknownNode(NodeId),
        #[error("Seeds missing from exploded metadata index: {0:?}")]
        UnknownSeed(Vec<NodeId>),
        #[error("Exploding FERC tables requires tables with only one value column. Got: {0:?}")]
        ValueColumnMismatch(BTreeSet<String>),
        #[error("Node '{node}' has inconsistent xbrl_factoid_original values: '{first}' != '{second}'")]
        InconsistentOriginalFactoid { node: NodeId, first: String, second: String },
        #[error("Calculation weights conflict on edge '{parent}' -> '{child}': {first} != {second}")]
        WeightConflict { parent: NodeId, child: NodeId, first: f64, second: f64 },
        #[error("Calculations in exploded metadata contain a cycle through '{node}'")]
        CycleDetected { node: NodeId },
        #[error("Conflicting values for tag '{tag}' inherited by '{node}': '{first}' != '{second}'")]
        TagConflict { node: NodeId, tag: String, first: String, second: String },
        #[error("Table '{table}' is not part of this explosion")]
        UnknownTable { table: String },
        #[error("Row in table '{table}' has no text value in factoid column '{column}'")]
        MissingFactoid { table: String, column: String },
        #[error("Duplicate record for '{node}' at [{keys}]")]
        DuplicateRecord { node: NodeId, keys: String },
        #[error("Calculated value for '{node}' at [{keys}] has no analog in the reported data")]
        UnmatchedCalculation { node: NodeId, keys: String },
        #[error("Multiple other subdimensions not yet implemented: {0:?}")]
        MultipleSubdimensions(Vec<String>),
        #[error("Calculations in {root_table} are off by {off_ratio}. Expected tolerance of {tolerance}.")]
        ToleranceExceeded { root_table: String, off_ratio: f64, tolerance: f64 },
        #[error("Invalid explosion configuration: {0}")]
        InvalidConfig(String),
        #[error("Invalid JSON: {0}")]
        Json(#[from] serde_json::Error),
        #[error(transparent)]
        Schema(#[from] ValidationError),
    }
}

/// A single table handed to the explosion. `keys` carries every primary-key
/// column, including the table's own factoid column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    pub keys: BTreeMap<String, Datum>,
    pub values: BTreeMap<String, Option<f64>>,
}

impl TableRow {
    pub fn new() -> Self { Self::default() }

    pub fn key(mut self, column: &str, value: impl Into<Datum>) -> Self {
        self.keys.insert(column.to_string(), value.into());
        self
    }

    pub fn value(mut self, column: &str, value: Option<f64>) -> Self {
        self.values.insert(column.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableFrame {
    pub table_name: String,
    pub rows: Vec<TableRow>,
}

impl TableFrame {
    pub fn new(table_name: impl Into<String>, rows: Vec<TableRow>) -> Self {
        Self { table_name: table_name.into(), rows }
    }
}

/// One row of the concatenated, exploded dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplodedRecord {
    pub table_name: String,
    pub xbrl_factoid: String,
    /// Non-factoid primary-key columns (and any other key-like columns the source table carried).
    pub keys: BTreeMap<String, Datum>,
    pub values: BTreeMap<String, Option<f64>>,
    pub row_type: Option<RowType>,
    pub intra_table_calc_flag: Option<bool>,
    pub xbrl_factoid_original: Option<String>,
    pub calculated_amount: Option<f64>,
    pub abs_diff: Option<f64>,
    pub rel_diff: Option<f64>,
    /// Set on correction records: the factoid whose residual they absorb.
    pub original_factoid: Option<String>,
}

impl ExplodedRecord {
    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.table_name.clone(), self.xbrl_factoid.clone())
    }

    #[inline]
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }

    /// Projection of `keys` onto `columns`, with absent columns as `Null`.
    pub fn key_projection(&self, columns: &[String]) -> BTreeMap<String, Datum> {
        columns
            .iter()
            .map(|c| (c.clone(), self.keys.get(c).cloned().unwrap_or_default()))
            .collect()
    }
}
