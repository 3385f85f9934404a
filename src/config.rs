//! Configuration of one explosion: the tables it combines and how strictly it reconciles them.

use crate::compute::ExplosionError;
use crate::store::{NodeId, Resource};
use crate::validation::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What to do when the engine meets an inconsistency it could resolve by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnConflict {
    /// Abort the explosion.
    #[default]
    Error,
    /// Log the inconsistency and continue.
    Log,
}

/// Element-wise closeness: `|calculated - reported| <= atol + rtol * |reported|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsClose {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for IsClose {
    fn default() -> Self {
        Self { rtol: 1e-5, atol: 1e-8 }
    }
}

/// How one table takes part in an explosion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableParams {
    pub table_name: String,
    /// The table's factoid column, renamed to `xbrl_factoid` in the exploded data.
    pub xbrl_factoid_name: String,
    /// The value column reconciled and scaled by leaf weights.
    pub column_to_check: String,
    /// Secondary partition column of the table (e.g. `utility_type`), if any.
    #[serde(default)]
    pub subtotal_column: Option<String>,
    pub primary_key: Vec<String>,
}

impl TableParams {
    /// Derives the parameters of a table from its resource schema.
    pub fn from_resource(
        resource: &Resource,
        xbrl_factoid_name: &str,
        column_to_check: &str,
        subtotal_column: Option<&str>,
    ) -> Result<Self, ExplosionError> {
        let schema = &resource.schema;
        for column in [Some(xbrl_factoid_name), Some(column_to_check), subtotal_column].into_iter().flatten() {
            if schema.field(column).is_none() {
                return Err(ValidationError::definition(
                    column,
                    format!("not a field of resource {}", resource.name),
                )
                .into());
            }
        }
        let params = Self {
            table_name: resource.name.clone(),
            xbrl_factoid_name: xbrl_factoid_name.to_string(),
            column_to_check: column_to_check.to_string(),
            subtotal_column: subtotal_column.map(str::to_string),
            primary_key: schema.primary_key().to_vec(),
        };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<(), ExplosionError> {
        if !self.primary_key.contains(&self.xbrl_factoid_name) {
            return Err(ExplosionError::InvalidConfig(format!(
                "factoid column {} is not part of the primary key of {}",
                self.xbrl_factoid_name, self.table_name
            )));
        }
        Ok(())
    }
}

fn default_tolerance() -> f64 { 0.05 }

/// Largest `calculation_tolerance` any explosion is allowed to run with.
pub const MAX_CALCULATION_TOLERANCE: f64 = 0.25;

/// Nodes that are reported only in the legacy DBF data and cannot be reconciled yet.
pub fn default_excluded_nodes() -> BTreeSet<NodeId> {
    ["special_funds_all", "nuclear_fuel"]
        .into_iter()
        .map(|f| NodeId::new("balance_sheet_assets_ferc1", f))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplosionConfig {
    /// The table whose factoids are the roots of the explosion.
    pub root_table: String,
    pub tables: Vec<TableParams>,
    /// Largest acceptable fraction of inter-table calculations that disagree with reported values.
    #[serde(default = "default_tolerance")]
    pub calculation_tolerance: f64,
    #[serde(default)]
    pub isclose: IsClose,
    /// Restricts the forest to these roots; empty means every node.
    #[serde(default)]
    pub seeds: Vec<NodeId>,
    #[serde(default = "default_excluded_nodes")]
    pub excluded_nodes: BTreeSet<NodeId>,
    #[serde(default)]
    pub on_cycle: OnConflict,
    #[serde(default)]
    pub on_tag_conflict: OnConflict,
    /// Drop records of components that were removed from calculations reaching
    /// outside the explosion. Loses detail, so off unless asked for.
    #[serde(default)]
    pub remove_inter_table_duplicates: bool,
}

impl ExplosionConfig {
    pub fn new(root_table: impl Into<String>, tables: Vec<TableParams>) -> Self {
        Self {
            root_table: root_table.into(),
            tables,
            calculation_tolerance: default_tolerance(),
            isclose: IsClose::default(),
            seeds: Vec::new(),
            excluded_nodes: default_excluded_nodes(),
            on_cycle: OnConflict::default(),
            on_tag_conflict: OnConflict::default(),
            remove_inter_table_duplicates: false,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ExplosionError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.calculation_tolerance = tolerance;
        self
    }

    pub fn with_seeds(mut self, seeds: Vec<NodeId>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn validate(&self) -> Result<(), ExplosionError> {
        if self.tables.is_empty() {
            return Err(ExplosionError::InvalidConfig("an explosion needs at least one table".into()));
        }
        let mut names = BTreeSet::new();
        for table in &self.tables {
            if !names.insert(table.table_name.as_str()) {
                return Err(ExplosionError::InvalidConfig(format!("table {} is listed twice", table.table_name)));
            }
            table.validate()?;
        }
        if !names.contains(self.root_table.as_str()) {
            return Err(ExplosionError::InvalidConfig(format!(
                "root table {} is not one of the exploded tables",
                self.root_table
            )));
        }
        if !(0.0..=MAX_CALCULATION_TOLERANCE).contains(&self.calculation_tolerance) {
            return Err(ExplosionError::InvalidConfig(format!(
                "calculation_tolerance must lie in [0, {}], got {}",
                MAX_CALCULATION_TOLERANCE, self.calculation_tolerance
            )));
        }
        if !(self.isclose.rtol >= 0.0 && self.isclose.atol >= 0.0) {
            return Err(ExplosionError::InvalidConfig("isclose tolerances must be non-negative".into()));
        }
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&TableParams> {
        self.tables.iter().find(|t| t.table_name == name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.table_name.clone()).collect()
    }
}
