//! Explodes nested FERC Form 1 tables into the leaf-level factoids their
//! reported totals are calculated from.
//!
//! The pipeline for one group of tables:
//!
//! 1. [`store::MetadataExploder`] merges the calculation metadata of the tables.
//! 2. [`analysis::CalculationForest`] builds the calculation graph, restricts it
//!    to the seeds, elides passthrough nodes and propagates weights and tags to
//!    the leaves.
//! 3. [`compute::InterTableReconciler`] recomputes inter-table calculations and
//!    adds correction records where they disagree with the reported values.
//! 4. The reconciled data is joined onto the leaves and scaled by their weights.
//!
//! [`Exploder`] runs these steps; [`boom_all`] runs independent groups in parallel.

pub mod analysis;
pub mod compute;
pub mod config;
pub mod display;
pub mod explode;
pub mod graph;
pub mod store;
pub mod validation;

pub use config::{ExplosionConfig, IsClose, OnConflict, TableParams};
pub use compute::ExplosionError;
pub use explode::{boom_all, Exploder, Explosion};
pub use store::NodeId;
