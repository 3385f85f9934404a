//! Defines the core data structures for the calculation graph.
pub mod dag;
pub mod edge;
pub mod node;

// Re-export key types for convenient access
pub use dag::CalculationGraph;
pub use edge::CalcEdge;
pub use node::CalcNode;
