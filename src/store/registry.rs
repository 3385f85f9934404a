use super::calculation::Calculation;
use super::types::{NodeId, RowType, Tags};
use crate::compute::ExplosionError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A row of one table's cleaned XBRL metadata, as delivered by the table transformers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XbrlMetadataRow {
    pub xbrl_factoid: String,
    #[serde(default)]
    pub xbrl_factoid_original: Option<String>,
    /// Serialized list of calculation components.
    #[serde(default)]
    pub calculations: String,
    pub row_type_xbrl: RowType,
    #[serde(default)]
    pub intra_table_calc_flag: bool,
}

/// A metadata row after ingestion: the calculation is parsed and the row knows its table.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRow {
    pub table_name: String,
    pub xbrl_factoid: String,
    pub xbrl_factoid_original: Option<String>,
    pub calculation: Calculation,
    pub intra_table_calc_flag: bool,
    /// True when every component of the calculation is drawn from a table of the explosion.
    pub in_explosion: bool,
}

impl MetadataRow {
    pub fn from_xbrl(table_name: &str, raw: &XbrlMetadataRow) -> Result<Self, ExplosionError> {
        let node = NodeId::new(table_name, raw.xbrl_factoid.clone());
        let calculation = Calculation::parse(&node, raw.row_type_xbrl, &raw.calculations)?;
        Ok(Self {
            table_name: table_name.to_string(),
            xbrl_factoid: raw.xbrl_factoid.clone(),
            xbrl_factoid_original: raw.xbrl_factoid_original.clone(),
            calculation,
            intra_table_calc_flag: raw.intra_table_calc_flag,
            in_explosion: true,
        })
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.table_name.clone(), self.xbrl_factoid.clone())
    }

    pub fn row_type(&self) -> RowType {
        self.calculation.row_type()
    }

    /// Calculated values whose components are not all reported in their own table.
    pub fn is_inter_table_calculation(&self) -> bool {
        self.row_type() == RowType::CalculatedValue && !self.intra_table_calc_flag
    }
}

/// The combined metadata of every table in an explosion, indexed by `(table_name, xbrl_factoid)`.
#[derive(Debug, Clone, Default)]
pub struct ExplodedMetadata {
    rows: Vec<MetadataRow>,
    index: HashMap<NodeId, usize>,
    /// Component names dropped from calculations because they live outside the explosion.
    pub removed_components: BTreeSet<String>,
}

impl ExplodedMetadata {
    pub fn new(rows: Vec<MetadataRow>) -> Result<Self, ExplosionError> {
        let mut index = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if index.insert(row.node_id(), i).is_some() {
                return Err(ExplosionError::DuplicateMetadata(row.node_id()));
            }
        }
        Ok(Self {
            rows,
            index,
            removed_components: BTreeSet::new(),
        })
    }

    pub fn rows(&self) -> &[MetadataRow] { &self.rows }
    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn get(&self, node: &NodeId) -> Option<&MetadataRow> {
        self.index.get(node).map(|&i| &self.rows[i])
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.index.contains_key(node)
    }

    /// Every node of the index, in row order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.rows.iter().map(MetadataRow::node_id)
    }

    /// Restricts the metadata to the given nodes, keeping row order.
    pub fn restricted_to(&self, nodes: &BTreeSet<NodeId>) -> Vec<&MetadataRow> {
        self.rows.iter().filter(|r| nodes.contains(&r.node_id())).collect()
    }
}

/// Additional per-node annotations merged onto graph nodes and inherited by leaves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagTable {
    tags: HashMap<NodeId, Tags>,
}

impl TagTable {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, node: NodeId, tag: impl Into<String>, value: impl Into<String>) {
        self.tags.entry(node).or_default().insert(tag.into(), value.into());
    }

    /// Tags of `node`, empty when the node is not tagged.
    pub fn get(&self, node: &NodeId) -> Tags {
        self.tags.get(node).cloned().unwrap_or_default()
    }

    /// Builds a table from one `(node, tags)` row per node.
    pub fn from_rows<I>(rows: I) -> Result<Self, ExplosionError>
    where
        I: IntoIterator<Item = (NodeId, Tags)>,
    {
        let mut table = Self::new();
        for (node, tags) in rows {
            if table.tags.insert(node.clone(), tags).is_some() {
                return Err(ExplosionError::DuplicateMetadata(node));
            }
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(factoid: &str, row_type: RowType, calcs: &str) -> XbrlMetadataRow {
        XbrlMetadataRow {
            xbrl_factoid: factoid.into(),
            xbrl_factoid_original: Some(factoid.into()),
            calculations: calcs.into(),
            row_type_xbrl: row_type,
            intra_table_calc_flag: true,
        }
    }

    #[test]
    fn test_metadata_row_from_json() {
        let json = r#"{
            "xbrl_factoid": "total",
            "xbrl_factoid_original": "Total",
            "calculations": "[{\"name\": \"a\", \"weight\": 1.0, \"source_tables\": [\"t\"]}]",
            "row_type_xbrl": "calculated_value",
            "intra_table_calc_flag": true
        }"#;
        let raw: XbrlMetadataRow = serde_json::from_str(json).unwrap();
        let row = MetadataRow::from_xbrl("t", &raw).unwrap();
        assert_eq!(row.node_id(), NodeId::new("t", "total"));
        assert_eq!(row.calculation.components().len(), 1);
        assert!(!row.is_inter_table_calculation());
    }

    #[test]
    fn test_duplicate_index_is_rejected() {
        let r = MetadataRow::from_xbrl("t", &raw("a", RowType::ReportedValue, "[]")).unwrap();
        let err = ExplodedMetadata::new(vec![r.clone(), r]).unwrap_err();
        assert!(matches!(err, ExplosionError::DuplicateMetadata(n) if n == NodeId::new("t", "a")));
    }

    #[test]
    fn test_lookup_and_restriction() {
        let rows = vec![
            MetadataRow::from_xbrl("t", &raw("a", RowType::ReportedValue, "[]")).unwrap(),
            MetadataRow::from_xbrl("u", &raw("a", RowType::ReportedValue, "[]")).unwrap(),
        ];
        let meta = ExplodedMetadata::new(rows).unwrap();
        assert!(meta.contains(&NodeId::new("u", "a")));
        assert!(meta.get(&NodeId::new("v", "a")).is_none());
        let keep: BTreeSet<NodeId> = [NodeId::new("u", "a")].into_iter().collect();
        let restricted = meta.restricted_to(&keep);
        assert_eq!(restricted.len(), 1);
        assert_eq!(restricted[0].table_name, "u");
    }

    #[test]
    fn test_tag_table_defaults_to_empty() {
        let mut tags = TagTable::new();
        tags.insert(NodeId::new("t", "a"), "rate_base_tag", "yes");
        assert_eq!(tags.get(&NodeId::new("t", "a")).get("rate_base_tag").map(String::as_str), Some("yes"));
        assert!(tags.get(&NodeId::new("t", "b")).is_empty());
    }
}
