//! Error types for volcano-durable

use crate::state::WorkflowState;
use thiserror::Error;

/// Engine error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Engine could not be reached
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    /// Engine did not answer in time
    #[error("engine timeout after {0}ms")]
    Timeout(u64),

    /// No such workflow execution
    #[error("workflow execution not found: {0}")]
    NotFound(String),

    /// Engine refused the request (unknown type, bad signal, ...)
    #[error("rejected by engine: {0}")]
    Rejected(String),

    /// Operation not allowed in the workflow's current state
    #[error("cannot {operation} a workflow that is {state}")]
    InvalidState {
        /// Current state
        state: WorkflowState,
        /// Attempted operation
        operation: String,
    },

    /// Unexpected engine response
    #[error("engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether retrying the same call may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, EngineError>;
