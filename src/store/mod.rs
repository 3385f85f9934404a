//! Metadata ingestion: identifiers, calculations, per-table metadata and schemas.
pub mod calculation;
pub mod components;
pub mod exploder;
pub mod registry;
pub mod schema;
pub mod types;

pub use calculation::{Calculation, CalculationComponent};
pub use components::{calculation_component_table, explode_source_tables, in_explosion_tables, ComponentRow};
pub use exploder::MetadataExploder;
pub use registry::{ExplodedMetadata, MetadataRow, TagTable, XbrlMetadataRow};
pub use schema::{check_foreign_keys, Field, FieldConstraints, FieldType, FieldValue, ForeignKey, ForeignKeyReference, Resource, Schema};
pub use types::{format_keys, Datum, NodeId, RowType, Tags, CORRECTION_SUFFIX};
