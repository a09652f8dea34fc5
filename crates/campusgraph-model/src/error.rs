use crate::graph::NodeId;

/// Errors raised by graph stores and the algorithms that run over them.
///
/// A refused deletion is not an error: rewiring reports it as `Ok(false)`.
/// Likewise an unreachable goal is an empty path, not an error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("Graph has no node with a traversable edge to start from")]
    EmptyGraph,
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl GraphError {
    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        GraphError::InvalidGeometry(message.into())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        GraphError::Storage(err.to_string())
    }
}
