//! Identifiers and small value types shared by every stage of an explosion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Suffix naming the correction factoid that absorbs a calculation residual.
pub const CORRECTION_SUFFIX: &str = "_correction";

/// Tag key -> tag value, e.g. `rate_base_tag -> yes`.
pub type Tags = BTreeMap<String, String>;

/// The source table and XBRL factoid identifying a node in a calculation tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub source_table: String,
    pub xbrl_factoid: String,
}

impl NodeId {
    pub fn new(source_table: impl Into<String>, xbrl_factoid: impl Into<String>) -> Self {
        Self {
            source_table: source_table.into(),
            xbrl_factoid: xbrl_factoid.into(),
        }
    }

    /// The correction node that pairs with this factoid in the same table.
    pub fn correction(&self) -> NodeId {
        NodeId::new(
            self.source_table.clone(),
            format!("{}{}", self.xbrl_factoid, CORRECTION_SUFFIX),
        )
    }

    pub fn is_correction(&self) -> bool {
        self.xbrl_factoid.ends_with(CORRECTION_SUFFIX)
    }

    /// True when `self` is the correction record of `other`.
    pub fn is_correction_of(&self, other: &NodeId) -> bool {
        self.source_table == other.source_table
            && self.xbrl_factoid.len() == other.xbrl_factoid.len() + CORRECTION_SUFFIX.len()
            && self.xbrl_factoid.starts_with(other.xbrl_factoid.as_str())
            && self.is_correction()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_table, self.xbrl_factoid)
    }
}

/// Classification of a factoid in the XBRL metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowType {
    ReportedValue,
    CalculatedValue,
    Correction,
}

/// A primary-key cell. Columns absent from a table are filled with `Null`
/// when tables are concatenated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Datum {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "<NA>"),
            Datum::Bool(b) => write!(f, "{}", b),
            Datum::Int(i) => write!(f, "{}", i),
            Datum::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self { Datum::Text(value.to_string()) }
}

impl From<String> for Datum {
    fn from(value: String) -> Self { Datum::Text(value) }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self { Datum::Int(value) }
}

impl From<bool> for Datum {
    fn from(value: bool) -> Self { Datum::Bool(value) }
}

/// Renders a primary-key projection for log lines and error messages.
pub fn format_keys(keys: &BTreeMap<String, Datum>) -> String {
    keys.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}
