//! Error types shared by graph-structured agent loops.
//!
//! This module defines the small error hierarchy that domain crates built on
//! top of `langgraph-core` (such as `orchestrator`) wrap their own error
//! types around. It intentionally stays generic: validation, node-execution,
//! state, and timeout failures are the categories every graph-shaped engine
//! needs, regardless of what the nodes actually do.

use thiserror::Error;

/// Errors that can occur while building or running a node-graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The graph structure itself is invalid (unknown node name, duplicate id, cycle
    /// where a DAG was required, ...).
    #[error("graph validation failed: {0}")]
    Validation(String),

    /// A specific node's handler returned an error while executing.
    #[error("node '{node}' failed: {error}")]
    NodeExecution { node: String, error: String },

    /// State could not be read, merged, or written.
    #[error("state error: {0}")]
    State(String),

    /// A blocking operation exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Serialization/deserialization of graph state or messages failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for application-defined failures that don't fit the above.
    #[error("{0}")]
    Custom(String),
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_execution_error_formats_node_name() {
        let err = GraphError::NodeExecution {
            node: "analysis".to_string(),
            error: "boom".to_string(),
        };
        assert!(err.to_string().contains("analysis"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn serialization_error_converts_via_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: GraphError = json_err.into();
        assert!(matches!(err, GraphError::Serialization(_)));
    }
}
