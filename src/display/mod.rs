//! Text rendering of calculations.
pub mod trace;

pub use trace::{format_calculation_tree, pprint_calculation_at};
