//! Error types for volcano-tools

use thiserror::Error;

/// Tool error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Tool not found
    #[error("tool not found: {0}")]
    NotFound(String),

    /// Tool execution failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Definition rejected while building the tool
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    /// A relative reference was used with no prior result
    #[error("no previous result to refer to")]
    MissingReference,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
