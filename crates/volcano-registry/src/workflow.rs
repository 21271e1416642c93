//! Workflow definitions
//!
//! A workflow definition describes a workflow type the durable engine knows
//! how to run. Volcano never executes the stages itself; it only needs the
//! type name, the task queue and the execution limits to start one.

use crate::definition::parse_duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default task queue shared by the built-in workflows
pub const DEFAULT_TASK_QUEUE: &str = "volcano-workflows";

/// Workflow type as loaded from a definition file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow type name (e.g. `DataPipelineWorkflow`)
    pub name: String,
    /// Definition version (dotted numeric)
    pub version: String,
    /// Classification domain this workflow serves
    pub domain: String,
    /// Base task queue; tenants get `<task_queue>-<tenant>`
    #[serde(default = "default_task_queue")]
    pub task_queue: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Classification patterns (case-insensitive regular expressions)
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Rule ordering inside the workflow group (higher first)
    #[serde(default)]
    pub priority: i32,
    /// Execution limits passed to the engine
    #[serde(default)]
    pub configuration: WorkflowConfiguration,
    /// Stage names, informational
    #[serde(default)]
    pub stages: Vec<String>,
}

fn default_task_queue() -> String {
    DEFAULT_TASK_QUEUE.to_string()
}

/// Execution limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfiguration {
    /// Execution timeout such as `1h` or `30m`
    #[serde(default = "default_max_duration")]
    pub max_duration: String,
    /// Engine-side retry policy
    #[serde(default)]
    pub retry_policy: RetryPolicy,
}

fn default_max_duration() -> String {
    "1h".to_string()
}

impl Default for WorkflowConfiguration {
    fn default() -> Self {
        Self {
            max_duration: default_max_duration(),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Engine-side retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts the engine makes for failing activities
    #[serde(default = "default_maximum_attempts")]
    pub maximum_attempts: u32,
}

fn default_maximum_attempts() -> u32 {
    3
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            maximum_attempts: default_maximum_attempts(),
        }
    }
}

impl WorkflowDefinition {
    /// Create a new workflow definition
    #[must_use]
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            domain: domain.into(),
            task_queue: default_task_queue(),
            description: String::new(),
            patterns: Vec::new(),
            priority: 0,
            configuration: WorkflowConfiguration::default(),
            stages: Vec::new(),
        }
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a classification pattern
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Set the execution timeout
    #[must_use]
    pub fn with_max_duration(mut self, max_duration: impl Into<String>) -> Self {
        self.configuration.max_duration = max_duration.into();
        self
    }

    /// Set the stage names
    #[must_use]
    pub fn with_stages(mut self, stages: &[&str]) -> Self {
        self.stages = stages.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Execution timeout; definitions are validated on install, so a bad
    /// value here only happens for hand-built definitions and maps to 1h
    #[must_use]
    pub fn execution_timeout(&self) -> Duration {
        parse_duration(&self.configuration.max_duration).unwrap_or(Duration::from_secs(3600))
    }
}

/// A workflow definition and the path that owns it
#[derive(Debug, Clone)]
pub struct InstalledWorkflow {
    /// The definition
    pub definition: Arc<WorkflowDefinition>,
    /// Owning definition file (`None` for built-ins)
    pub source_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let def: WorkflowDefinition = serde_json::from_value(serde_json::json!({
            "name": "GitOpsWorkflow",
            "version": "1.0.0",
            "domain": "gitops"
        }))
        .unwrap();

        assert_eq!(def.task_queue, DEFAULT_TASK_QUEUE);
        assert_eq!(def.configuration.max_duration, "1h");
        assert_eq!(def.configuration.retry_policy.maximum_attempts, 3);
        assert_eq!(def.execution_timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn test_builder() {
        let def = WorkflowDefinition::new("LongRunningAnalyticsWorkflow", "analytics")
            .with_max_duration("2d")
            .with_stages(&["collect", "aggregate", "report"]);

        assert_eq!(def.execution_timeout(), Duration::from_secs(2 * 24 * 3600));
        assert_eq!(def.stages.len(), 3);
    }
}
