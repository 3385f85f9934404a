//! Calculations declared by the XBRL metadata.
//!
//! The metadata carries each calculation as a JSON list of component
//! descriptors next to a `row_type_xbrl` tag. Both are folded into the
//! [`Calculation`] sum type once, at ingestion.

use super::types::{NodeId, RowType, CORRECTION_SUFFIX};
use crate::compute::ExplosionError;
use serde::{de, Deserialize, Deserializer, Serialize};
use smallvec::SmallVec;
use tracing::warn;

/// One weighted reference from a calculated factoid to another factoid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationComponent {
    pub name: String,
    pub weight: f64,
    /// Tables the component is reported in. Normally exactly one, never none.
    #[serde(deserialize_with = "non_empty_tables")]
    pub source_tables: SmallVec<[String; 1]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utility_type: Option<String>,
    /// Value of the source table's "other dimension" column the component is restricted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdimension: Option<String>,
}

fn non_empty_tables<'de, D>(deserializer: D) -> Result<SmallVec<[String; 1]>, D::Error>
where
    D: Deserializer<'de>,
{
    let tables = SmallVec::<[String; 1]>::deserialize(deserializer)?;
    if tables.is_empty() {
        return Err(de::Error::custom("calculation component has no source tables"));
    }
    Ok(tables)
}

impl CalculationComponent {
    pub fn new(name: impl Into<String>, weight: f64, source_table: impl Into<String>) -> Self {
        let mut source_tables = SmallVec::new();
        source_tables.push(source_table.into());
        Self {
            name: name.into(),
            weight,
            source_tables,
            utility_type: None,
            subdimension: None,
        }
    }

    pub fn with_utility_type(mut self, utility_type: impl Into<String>) -> Self {
        self.utility_type = Some(utility_type.into());
        self
    }

    pub fn with_subdimension(mut self, subdimension: impl Into<String>) -> Self {
        self.subdimension = Some(subdimension.into());
        self
    }

    pub fn is_correction(&self) -> bool {
        self.name.ends_with(CORRECTION_SUFFIX)
    }

    pub fn has_single_source(&self) -> bool {
        self.source_tables.len() == 1
    }

    /// One node per source table the component is drawn from.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.source_tables
            .iter()
            .map(move |table| NodeId::new(table.clone(), self.name.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Calculation {
    #[default]
    Reported,
    Calculated(Vec<CalculationComponent>),
    Correction,
}

impl Calculation {
    /// Parses the serialized component list of `node`. Components given on a
    /// row that is not a calculated value are discarded.
    pub fn parse(node: &NodeId, row_type: RowType, raw: &str) -> Result<Self, ExplosionError> {
        let trimmed = raw.trim();
        let components: Vec<CalculationComponent> = if trimmed.is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(trimmed).map_err(|source| ExplosionError::InvalidCalculation {
                node: node.clone(),
                source,
            })?
        };

        match row_type {
            RowType::CalculatedValue => Ok(Calculation::Calculated(components)),
            RowType::ReportedValue | RowType::Correction => {
                if !components.is_empty() {
                    warn!(
                        "{} is tagged {:?} but declares {} calculation components; ignoring them.",
                        node,
                        row_type,
                        components.len()
                    );
                }
                Ok(match row_type {
                    RowType::Correction => Calculation::Correction,
                    _ => Calculation::Reported,
                })
            }
        }
    }

    pub fn row_type(&self) -> RowType {
        match self {
            Calculation::Reported => RowType::ReportedValue,
            Calculation::Calculated(_) => RowType::CalculatedValue,
            Calculation::Correction => RowType::Correction,
        }
    }

    pub fn components(&self) -> &[CalculationComponent] {
        match self {
            Calculation::Calculated(c) => c,
            _ => &[],
        }
    }

    /// Serializes the components back into the metadata's JSON form.
    pub fn to_json(&self) -> Result<String, ExplosionError> {
        Ok(serde_json::to_string(self.components())?)
    }
}
