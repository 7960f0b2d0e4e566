// SPDX-License-Identifier: MIT

//! Typed error handling for kinetic-flow
//!
//! Validation errors (`Graph`, `UnknownNodeType`) surface synchronously to
//! whoever starts a run. Execution-time errors are folded into a FAILED
//! node result by the orchestrator and never escape a running flow.

use thiserror::Error;

use crate::kinetic::workflow::state::RunStatus;

/// Top-level error type for kinetic-flow
#[derive(Debug, Error)]
pub enum EngineError {
    /// Flow graph failed static validation; the run never starts
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// No executor is registered for a node type
    #[error("Unknown node type '{node_type}' on node '{node_id}'")]
    UnknownNodeType { node_id: String, node_type: String },

    /// Executor-local failure
    #[error("Node '{node_id}' failed: {message}")]
    NodeExecution { node_id: String, message: String },

    /// Template or path resolution failed
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Wait descriptor was already completed
    #[error("Wait '{wait_id}' was already resumed")]
    AlreadyResumed { wait_id: String },

    /// Late signal against an expired wait or a terminated run
    #[error("Wait '{wait_id}' has expired")]
    ExpiredWait { wait_id: String },

    #[error("Wait '{0}' not found")]
    WaitNotFound(String),

    /// A wait with the same id is already registered
    #[error("Wait '{0}' already registered")]
    DuplicateWait(String),

    #[error("Run '{0}' not found")]
    RunNotFound(String),

    #[error("Flow '{0}' not found")]
    FlowNotFound(String),

    /// Run state machine rejected a transition
    #[error("Run '{run_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        run_id: String,
        from: RunStatus,
        to: RunStatus,
    },

    /// Malformed or undeliverable substrate signal
    #[error("Signal error: {0}")]
    Signal(String),

    /// Configuration errors (invalid env values, bad flow files)
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Static graph validation errors
#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    /// Ordering could not place every node: a cycle, or a component with no
    /// zero in-degree entry
    #[error("Cycle detected among nodes: {nodes:?}")]
    Cycle { nodes: Vec<String> },

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    /// Conditional node has several outgoing edges without true/false labels
    #[error("Conditional node '{node_id}' has unlabelled branches")]
    UnlabelledBranch { node_id: String },

    /// Branch label on an edge leaving a non-conditional node
    #[error("Edge '{edge_id}' is labelled but '{node_id}' is not a conditional node")]
    UnexpectedLabel { edge_id: String, node_id: String },
}

/// Expression resolution errors
#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    #[error("Index {index} out of range for '{path}' (length {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("Invalid path: {path}")]
    InvalidPath { path: String },
}

impl EngineError {
    /// Create a node execution error
    pub fn node(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeExecution {
            node_id: node_id.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Validation errors are reported to the run-start caller instead of
    /// failing a run
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Graph(_) | Self::UnknownNodeType { .. })
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_converts() {
        let err: EngineError = GraphError::Cycle {
            nodes: vec!["a".to_string(), "b".to_string()],
        }
        .into();
        assert!(err.is_validation());
        assert!(err.to_string().contains("Cycle detected"));
    }

    #[test]
    fn test_resolve_error_is_not_validation() {
        let err: EngineError = ResolveError::PathNotFound {
            path: "steps.x".to_string(),
        }
        .into();
        assert!(!err.is_validation());
        assert_eq!(err.to_string(), "Path not found: steps.x");
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = EngineError::InvalidTransition {
            run_id: "r1".to_string(),
            from: RunStatus::Completed,
            to: RunStatus::Running,
        };
        assert_eq!(
            err.to_string(),
            "Run 'r1' cannot move from COMPLETED to RUNNING"
        );
    }
}
