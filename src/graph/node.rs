//! Defines the `CalcNode`, a single factoid in a calculation graph.

use crate::store::{NodeId, Tags};

/// A factoid in the calculation graph.
///
/// Nodes hold the identity of the factoid and its annotations. Calculation
/// weights live on the incoming edge, since a weight describes how a
/// component contributes to one particular parent.
#[derive(Debug, Clone, PartialEq)]
pub struct CalcNode {
    pub id: NodeId,
    /// The factoid name before any aliasing, when known.
    pub xbrl_factoid_original: Option<String>,
    pub tags: Tags,
}

impl CalcNode {
    pub fn new(id: NodeId) -> Self {
        Self { id, xbrl_factoid_original: None, tags: Tags::new() }
    }

    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }
}
