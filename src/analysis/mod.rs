//! Graph analysis: pruning calculation graphs into forests and propagating weights to leaves.
pub mod forest;
pub mod leaves;
pub mod topology;

pub use forest::CalculationForest;
pub use leaves::{leafy_data, leafy_meta, root_calculations, LeafRecord, LeafyRecord};
pub use topology::Passthrough;
