//! Error types for volcano-core
//!
//! Every error maps to a machine-readable [`ErrorKind`] and a sanitized
//! user-facing message. `Display` output may carry internal detail and is
//! meant for logs only.

use crate::pipeline::DecompositionError;
use serde::Serialize;
use thiserror::Error;
use volcano_durable::{EngineError, WorkflowState};

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// The request could not be turned into a plan
    #[error("decomposition error: {0}")]
    Decomposition(#[from] DecompositionError),

    /// A plan step names a tool the snapshot does not have (or has disabled)
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// A tool returned an error
    #[error("tool '{tool}' failed: {source}")]
    ToolExecution {
        /// Tool name
        tool: String,
        /// Tool error
        #[source]
        source: volcano_tools::Error,
    },

    /// The fast path ran over its latency ceiling
    #[error("latency budget of {budget_ms}ms exceeded after {elapsed_ms}ms")]
    LatencyBudgetExceeded {
        /// Configured budget
        budget_ms: u64,
        /// Time spent when the check failed
        elapsed_ms: u64,
    },

    /// The request was cancelled by the caller
    #[error("request cancelled")]
    Cancelled,

    /// Starting a workflow exhausted its retries
    #[error("durable path unavailable after {attempts} attempts: {last_error}")]
    DurablePathUnavailable {
        /// Attempts made
        attempts: u32,
        /// Last engine error (internal detail)
        last_error: String,
    },

    /// Unknown workflow type or execution
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// The engine refused to start the workflow
    #[error("workflow start rejected: {workflow_type}: {reason}")]
    WorkflowStartRejected {
        /// Workflow type
        workflow_type: String,
        /// Engine reason (internal detail)
        reason: String,
    },

    /// The workflow started but ended in failure
    #[error("workflow {workflow_id} failed: {reason}")]
    WorkflowFailed {
        /// Workflow id
        workflow_id: String,
        /// Failure reported by the engine
        reason: String,
    },

    /// No session with this id
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Command not allowed in the workflow's current state
    #[error("cannot {operation} a workflow that is {state}")]
    InvalidState {
        /// Mirrored state
        state: WorkflowState,
        /// Attempted operation
        operation: String,
    },

    /// Definition registry error
    #[error("registry error: {0}")]
    Registry(#[from] volcano_registry::Error),

    /// Malformed request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error category carried by every failed response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`Error::Decomposition`]
    DecompositionError,
    /// See [`Error::ToolNotFound`]
    ToolNotFound,
    /// See [`Error::ToolExecution`]
    ToolExecutionError,
    /// See [`Error::LatencyBudgetExceeded`]
    LatencyBudgetExceeded,
    /// See [`Error::Cancelled`]
    Cancelled,
    /// A definition change failed validation
    ReloadValidationError,
    /// See [`Error::DurablePathUnavailable`]
    DurablePathUnavailable,
    /// See [`Error::WorkflowNotFound`]
    WorkflowNotFound,
    /// See [`Error::WorkflowStartRejected`]
    WorkflowStartRejected,
    /// See [`Error::WorkflowFailed`]
    WorkflowFailed,
    /// See [`Error::SessionNotFound`]
    SessionNotFound,
    /// See [`Error::InvalidState`]
    InvalidState,
    /// See [`Error::InvalidRequest`]
    InvalidRequest,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DecompositionError => "decomposition_error",
            Self::ToolNotFound => "tool_not_found",
            Self::ToolExecutionError => "tool_execution_error",
            Self::LatencyBudgetExceeded => "latency_budget_exceeded",
            Self::Cancelled => "cancelled",
            Self::ReloadValidationError => "reload_validation_error",
            Self::DurablePathUnavailable => "durable_path_unavailable",
            Self::WorkflowNotFound => "workflow_not_found",
            Self::WorkflowStartRejected => "workflow_start_rejected",
            Self::WorkflowFailed => "workflow_failed",
            Self::SessionNotFound => "session_not_found",
            Self::InvalidState => "invalid_state",
            Self::InvalidRequest => "invalid_request",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Error {
    /// Machine-readable category
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decomposition(_) => ErrorKind::DecompositionError,
            Self::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Self::ToolExecution { .. } => ErrorKind::ToolExecutionError,
            Self::LatencyBudgetExceeded { .. } => ErrorKind::LatencyBudgetExceeded,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::DurablePathUnavailable { .. } => ErrorKind::DurablePathUnavailable,
            Self::WorkflowNotFound(_) => ErrorKind::WorkflowNotFound,
            Self::WorkflowStartRejected { .. } => ErrorKind::WorkflowStartRejected,
            Self::WorkflowFailed { .. } => ErrorKind::WorkflowFailed,
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Registry(e) if e.is_validation() => ErrorKind::ReloadValidationError,
            Self::Registry(_) => ErrorKind::Internal,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether resending the whole request may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DurablePathUnavailable { .. } | Self::LatencyBudgetExceeded { .. }
        )
    }

    /// Map an engine error from a signal/query/cancel/status call
    pub(crate) fn from_engine(error: EngineError) -> Self {
        match error {
            EngineError::NotFound(id) => Self::WorkflowNotFound(id),
            EngineError::InvalidState { state, operation } => Self::InvalidState { state, operation },
            EngineError::Rejected(reason) => Self::InvalidRequest(reason),
            e @ (EngineError::Unavailable(_) | EngineError::Timeout(_)) => {
                Self::DurablePathUnavailable {
                    attempts: 1,
                    last_error: e.to_string(),
                }
            }
            EngineError::Internal(msg) => Self::Internal(msg),
        }
    }
}

/// Trait for user-friendly error messages
///
/// Messages never include paths, engine endpoints or other internals.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get a suggestion for how to fix the error
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for Error {
    fn user_message(&self) -> String {
        match self {
            Error::Decomposition(e) => format!("Could not understand the request: {e}"),
            Error::ToolNotFound(tool) => format!("Tool '{tool}' is not available."),
            Error::ToolExecution { tool, source } => format!("Tool '{tool}' failed: {source}"),
            Error::LatencyBudgetExceeded { budget_ms, .. } => {
                format!("The request did not finish within {budget_ms}ms.")
            }
            Error::Cancelled => "The request was cancelled.".to_string(),
            Error::DurablePathUnavailable { .. } => {
                "The workflow engine is unavailable right now.".to_string()
            }
            Error::WorkflowNotFound(name) => format!("Workflow '{name}' was not found."),
            Error::WorkflowStartRejected { workflow_type, .. } => {
                format!("The workflow engine refused to start '{workflow_type}'.")
            }
            Error::WorkflowFailed { workflow_id, .. } => {
                format!("Workflow '{workflow_id}' failed.")
            }
            Error::SessionNotFound(id) => format!("Session '{id}' was not found."),
            Error::InvalidState { state, operation } => {
                format!("Cannot {operation} a workflow that is {state}.")
            }
            Error::Registry(e) if e.is_validation() => format!("Invalid definition: {e}"),
            Error::Registry(_) => "The definition registry is unavailable.".to_string(),
            Error::InvalidRequest(msg) => format!("Invalid request: {msg}"),
            Error::Internal(_) => "An internal error occurred.".to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            Error::Decomposition(_) => {
                Some("Include the numbers to work with, e.g. 'calculate 42 + 58'.".to_string())
            }
            Error::LatencyBudgetExceeded { .. } | Error::DurablePathUnavailable { .. } => {
                Some("Retry the request.".to_string())
            }
            Error::WorkflowFailed { .. } => {
                Some("Query the workflow status instead of resending the request.".to_string())
            }
            Error::InvalidState { .. } => {
                Some("Check the workflow status before sending commands.".to_string())
            }
            _ => None,
        }
    }
}

/// Format an error for display in the CLI
pub fn format_error_for_cli(error: &Error) -> String {
    let mut output = format!("❌ {} [{}]\n", error.user_message(), error.kind());
    if let Some(suggestion) = error.suggestion() {
        output.push_str(&format!("💡 {suggestion}\n"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_snake_case() {
        assert_eq!(Error::Cancelled.kind().as_str(), "cancelled");
        assert_eq!(
            Error::ToolNotFound("modulo".into()).kind(),
            ErrorKind::ToolNotFound
        );
        let json = serde_json::to_value(ErrorKind::DurablePathUnavailable).unwrap();
        assert_eq!(json, "durable_path_unavailable");
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = Error::DurablePathUnavailable {
            attempts: 3,
            last_error: "connect error: http://10.0.0.7:7233".to_string(),
        };
        assert!(err.to_string().contains("10.0.0.7"));
        assert!(!err.user_message().contains("10.0.0.7"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_engine_error_mapping() {
        let err = Error::from_engine(EngineError::NotFound("wf-1".into()));
        assert_eq!(err.kind(), ErrorKind::WorkflowNotFound);

        let err = Error::from_engine(EngineError::InvalidState {
            state: WorkflowState::Completed,
            operation: "pause".into(),
        });
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        let err = Error::from_engine(EngineError::Timeout(5000));
        assert_eq!(err.kind(), ErrorKind::DurablePathUnavailable);
    }

    #[test]
    fn test_registry_validation_kind() {
        let err = Error::from(volcano_registry::Error::Invalid("bad version".into()));
        assert_eq!(err.kind(), ErrorKind::ReloadValidationError);
    }

    #[test]
    fn test_format_for_cli() {
        let output = format_error_for_cli(&Error::WorkflowFailed {
            workflow_id: "wf-1".into(),
            reason: "activity crashed".into(),
        });
        assert!(output.contains("[workflow_failed]"));
        assert!(output.contains("💡"));
        assert!(!output.contains("activity crashed"));
    }
}
