//! Defines the `CalcEdge` type, a parent factoid's dependency on one of its components.

use crate::store::NodeId;

/// A weighted calculation relationship `parent -> component`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalcEdge {
    /// Multiplier applied to the component's value when summing into the parent.
    pub weight: f64,
    /// Set when the edge replaced a passthrough node that was elided while pruning.
    pub spliced_from: Option<NodeId>,
}

impl CalcEdge {
    pub fn new(weight: f64) -> Self {
        Self { weight, spliced_from: None }
    }
}
