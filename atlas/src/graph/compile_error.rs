//! Graph compilation error.

use thiserror::Error;

/// Error when compiling a state graph.
///
/// Returned by `StateGraph::compile()`. Validation ensures every id in edges
/// (except START/END) exists in the node map, the graph has exactly one entry
/// edge, at least one path to END, and no node carries both an unconditional
/// edge and conditional edges.
#[derive(Debug, Error)]
pub enum CompilationError {
    /// A node id in an edge was not registered via `add_node`.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// No edge from START, or more than one.
    #[error("graph must have exactly one edge from START")]
    MissingStart,

    /// Nothing routes to END.
    #[error("graph must have at least one path to END")]
    MissingEnd,

    /// A node has more than one outgoing unconditional edge.
    #[error("node has multiple outgoing edges: {0}")]
    DuplicateEdge(String),

    /// A node has both an outgoing edge and conditional edges.
    #[error("node has both edge and conditional edges: {0}")]
    NodeHasBothEdgeAndConditional(String),

    /// A value in a conditional path_map is not a valid node id or END.
    #[error("conditional path_map invalid target: {0}")]
    InvalidConditionalPathMap(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Display of NodeNotFound carries the node id.
    #[test]
    fn display_node_not_found() {
        let s = CompilationError::NodeNotFound("resolve_ids".into()).to_string();
        assert!(s.contains("node not found"));
        assert!(s.contains("resolve_ids"));
    }

    /// **Scenario**: Display of the edge-shape errors mentions the offender.
    #[test]
    fn display_edge_errors() {
        assert!(CompilationError::DuplicateEdge("agent".into())
            .to_string()
            .contains("agent"));
        assert!(
            CompilationError::NodeHasBothEdgeAndConditional("validate_sql".into())
                .to_string()
                .contains("validate_sql")
        );
    }
}
