use crate::compute::ExplosionError;
use crate::graph::CalculationGraph;
use crate::store::{ExplodedMetadata, NodeId};
use std::collections::HashMap;
use std::fmt::Write;

/// The calculation components of `node` as pretty-printed JSON.
pub fn pprint_calculation_at(meta: &ExplodedMetadata, node: &NodeId) -> Result<String, ExplosionError> {
    let row = meta.get(node).ok_or_else(|| ExplosionError::UnknownNode(node.clone()))?;
    Ok(serde_json::to_string_pretty(row.calculation.components())?)
}

/// Renders the calculation below `root` as a text tree, one line per component.
pub fn format_calculation_tree(graph: &CalculationGraph, root: &NodeId) -> String {
    let mut tracer = Tracer {
        graph,
        visited_at_level: HashMap::new(),
        output: String::new(),
    };

    if graph.contains(root) {
        let _ = writeln!(tracer.output, "CALCULATION TREE for '{}':", root);
        let _ = writeln!(tracer.output, "--------------------------------------------------");
        tracer.trace_node(root, None, 1, "");
    } else {
        let _ = writeln!(tracer.output, "Error: Unknown node '{}'", root);
    }
    tracer.output
}

struct Tracer<'a> {
    graph: &'a CalculationGraph,
    visited_at_level: HashMap<NodeId, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn trace_node(&mut self, node: &NodeId, parent: Option<&NodeId>, level: usize, prefix: &str) {
        let header = match parent.and_then(|p| self.graph.edge(p, node)) {
            Some(edge) => {
                let via = edge
                    .spliced_from
                    .as_ref()
                    .map(|b| format!(" (via {})", b))
                    .unwrap_or_default();
                format!("[L{}] ({:+}) {}{}", level, edge.weight, node, via)
            }
            None => format!("[L{}] {}", level, node),
        };

        if let Some(&first_seen) = self.visited_at_level.get(node) {
            let _ = writeln!(self.output, "{}{} -> (Ref to L{})", prefix, header, first_seen);
            return;
        }
        self.visited_at_level.insert(node.clone(), level);

        let tags = self
            .graph
            .node(node)
            .filter(|n| !n.tags.is_empty())
            .map(|n| format!(" {:?}", n.tags))
            .unwrap_or_default();
        let _ = writeln!(self.output, "{}{}{}", prefix, header, tags);

        let children = self.graph.children(node);
        let stem = build_child_stem(prefix);
        for (i, child) in children.iter().enumerate() {
            let connector = if i == children.len() - 1 { "`--" } else { "|--" };
            self.trace_node(child, Some(node), level + 1, &format!("{}{}", stem, connector));
        }
    }
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`--", "   ").replace("|--", "|  ")
}
