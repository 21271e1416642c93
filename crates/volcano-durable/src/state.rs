//! Workflow state machine
//!
//! ```text
//! Running ⇄ Paused
//!    │         │
//!    ▼         ▼
//! Completed | Failed | Cancelled   (terminal)
//! ```
//!
//! The engine owns the transitions; Volcano only mirrors them and uses
//! [`WorkflowState::can_transition_to`] to refuse commands that cannot apply.

use serde::{Deserialize, Serialize};

/// State of a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Executing
    Running,
    /// Suspended by a `pause` signal
    Paused,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled by request
    Cancelled,
}

impl WorkflowState {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states never change
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `next` is reachable from this state in one step
    #[must_use]
    pub fn can_transition_to(&self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, next),
            (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Failed)
                | (Paused, Cancelled)
        )
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown workflow state: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_resume() {
        assert!(WorkflowState::Running.can_transition_to(WorkflowState::Paused));
        assert!(WorkflowState::Paused.can_transition_to(WorkflowState::Running));
        assert!(!WorkflowState::Paused.can_transition_to(WorkflowState::Completed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let all = [
            WorkflowState::Running,
            WorkflowState::Paused,
            WorkflowState::Completed,
            WorkflowState::Failed,
            WorkflowState::Cancelled,
        ];
        for terminal in all.iter().filter(|s| s.is_terminal()) {
            for next in all {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("Paused".parse::<WorkflowState>(), Ok(WorkflowState::Paused));
        assert_eq!("canceled".parse::<WorkflowState>(), Ok(WorkflowState::Cancelled));
        assert!("sleeping".parse::<WorkflowState>().is_err());
    }
}
