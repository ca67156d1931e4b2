//! Error types for closeflow operations.

use crate::domain::NodeId;
use crate::validation::EdgeRejection;
use std::io;
use thiserror::Error;

/// The error type for closeflow operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Node not found in the loaded graph.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A node with this ID is already part of the graph.
    #[error("Duplicate node: {0}")]
    DuplicateNode(NodeId),

    /// The dependency to remove does not exist.
    #[error("Dependency not found: {to} does not depend on {from}")]
    DependencyNotFound {
        /// The prerequisite
        from: NodeId,
        /// The dependent
        to: NodeId,
    },

    /// A proposed edge was declined by local validation.
    #[error("Edge rejected: {0}")]
    InvalidEdge(#[from] EdgeRejection),

    /// The workflow store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No async runtime is available to run persistence calls.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Errors reported across the workflow store boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the write.
    #[error("write rejected for node {node}: {detail}")]
    Rejected {
        /// Node the write targeted
        node: NodeId,
        /// Reason given by the store
        detail: String,
    },

    /// The store has no such node.
    #[error("node {0} not found in store")]
    NotFound(NodeId),

    /// The store's own cycle check refused a dependency write.
    #[error("circular dependency detected by store for node {node}")]
    CircularDependency {
        /// Node the write targeted
        node: NodeId,
    },

    /// The store does not implement an optional operation.
    #[error("operation not supported by store: {0}")]
    Unsupported(&'static str),
}

/// A specialized Result type for closeflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A specialized Result type for store boundary calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
