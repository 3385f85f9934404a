//! Reconciles calculated values with the reported data.
pub mod engine;
pub mod kernel;
pub mod ledger;

pub use engine::{InterTableReconciler, ReconciliationReport};
pub use ledger::{ExplodedRecord, ExplosionError, TableFrame, TableRow};
