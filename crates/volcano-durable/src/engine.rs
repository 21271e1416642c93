//! Durable engine contract

use crate::error::Result;
use crate::state::WorkflowState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request to start a workflow execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    /// Caller-chosen id; reused across start retries
    pub workflow_id: String,
    /// Workflow type name
    pub workflow_type: String,
    /// Task queue the workers listen on
    pub task_queue: String,
    /// Workflow input
    #[serde(default)]
    pub input: serde_json::Value,
    /// Overall execution timeout
    #[serde(with = "duration_secs")]
    pub execution_timeout: Duration,
    /// Engine-side retry attempts
    pub maximum_attempts: u32,
}

/// Identity of one workflow execution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Workflow id
    pub workflow_id: String,
    /// Run id assigned by the engine
    pub run_id: String,
}

impl WorkflowExecution {
    /// Create an execution identity
    #[must_use]
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

/// Engine-reported status of an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    /// Execution identity
    #[serde(flatten)]
    pub execution: WorkflowExecution,
    /// Workflow type name
    pub workflow_type: String,
    /// Task queue
    pub task_queue: String,
    /// Current state
    pub state: WorkflowState,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Close time, once terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Result, once completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure reason, once failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// External durable-execution capability
///
/// Implementations own the workflow state; callers only mirror it.
#[async_trait]
pub trait DurableEngine: Send + Sync {
    /// Engine name, for logs
    fn name(&self) -> &str;

    /// Start a workflow execution
    async fn start(&self, request: StartRequest) -> Result<WorkflowExecution>;

    /// Deliver a signal to a running execution
    async fn signal(
        &self,
        execution: &WorkflowExecution,
        signal_name: &str,
        payload: serde_json::Value,
    ) -> Result<()>;

    /// Run a read-only query against an execution
    async fn query(
        &self,
        execution: &WorkflowExecution,
        query_type: &str,
    ) -> Result<serde_json::Value>;

    /// Request cancellation
    async fn cancel(&self, execution: &WorkflowExecution) -> Result<()>;

    /// Request cancellation of whichever run of `workflow_id` is current
    ///
    /// Used when a start may have landed but its run id never came back.
    async fn cancel_workflow(&self, workflow_id: &str) -> Result<()>;

    /// Current status
    async fn status(&self, execution: &WorkflowExecution) -> Result<WorkflowStatus>;
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
