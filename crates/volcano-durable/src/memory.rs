//! In-memory durable engine
//!
//! Keeps executions in process memory. Nothing survives a restart, so this
//! is for development and tests; it implements the same state machine and
//! signal/query surface a real engine exposes:
//! - signals: `pause`, `resume` (others are recorded)
//! - queries: `state`, `progress`, `signals`

use crate::engine::{DurableEngine, StartRequest, WorkflowExecution, WorkflowStatus};
use crate::error::{EngineError, Result};
use crate::state::WorkflowState;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Execution {
    status: WorkflowStatus,
    input: serde_json::Value,
    progress: u8,
    signals: Vec<String>,
}

/// Durable engine backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    executions: DashMap<String, Execution>,
    /// Workflow types this engine accepts; empty accepts any
    registered_types: Mutex<HashSet<String>>,
    failing_starts: AtomicU32,
    start_attempts: AtomicU32,
    start_delay: Mutex<Option<Duration>>,
}

impl InMemoryEngine {
    /// Create an engine that accepts any workflow type
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict accepted workflow types
    #[must_use]
    pub fn with_registered_types<I, S>(self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self
            .registered_types
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = types.into_iter().map(Into::into).collect();
        self
    }

    /// Make the next `count` starts fail with [`EngineError::Unavailable`]
    pub fn fail_next_starts(&self, count: u32) {
        self.failing_starts.store(count, Ordering::SeqCst);
    }

    /// Delay every start by `delay` (to exercise caller timeouts)
    pub fn set_start_delay(&self, delay: Option<Duration>) {
        *self.start_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Number of start calls received, including failed ones
    #[must_use]
    pub fn start_attempts(&self) -> u32 {
        self.start_attempts.load(Ordering::SeqCst)
    }

    /// Number of known executions
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.executions.len()
    }

    /// Input an execution was started with
    #[must_use]
    pub fn input_of(&self, workflow_id: &str) -> Option<serde_json::Value> {
        self.executions.get(workflow_id).map(|e| e.input.clone())
    }

    /// Current state of `workflow_id`, whichever run that is
    #[must_use]
    pub fn state_of(&self, workflow_id: &str) -> Option<WorkflowState> {
        self.executions.get(workflow_id).map(|e| e.status.state)
    }

    /// Set reported progress (0-100)
    pub fn set_progress(&self, execution: &WorkflowExecution, progress: u8) -> Result<()> {
        let mut entry = self.lookup(execution)?;
        entry.progress = progress.min(100);
        Ok(())
    }

    /// Finish an execution successfully
    pub fn complete(&self, execution: &WorkflowExecution, result: serde_json::Value) -> Result<()> {
        let mut entry = self.lookup(execution)?;
        Self::transition(&mut entry, WorkflowState::Completed, "complete")?;
        entry.progress = 100;
        entry.status.result = Some(result);
        Ok(())
    }

    /// Finish an execution with a failure
    pub fn fail(&self, execution: &WorkflowExecution, reason: impl Into<String>) -> Result<()> {
        let mut entry = self.lookup(execution)?;
        Self::transition(&mut entry, WorkflowState::Failed, "fail")?;
        entry.status.failure = Some(reason.into());
        Ok(())
    }

    fn lookup(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, Execution>> {
        self.executions
            .get_mut(&execution.workflow_id)
            .filter(|e| e.status.execution.run_id == execution.run_id)
            .ok_or_else(|| EngineError::NotFound(execution.workflow_id.clone()))
    }

    fn transition(entry: &mut Execution, next: WorkflowState, operation: &str) -> Result<()> {
        let current = entry.status.state;
        if !current.can_transition_to(next) {
            return Err(EngineError::InvalidState {
                state: current,
                operation: operation.to_string(),
            });
        }
        entry.status.state = next;
        if next.is_terminal() {
            entry.status.closed_at = Some(Utc::now());
        }
        debug!(
            workflow_id = %entry.status.execution.workflow_id,
            from = %current,
            to = %next,
            "Workflow state changed"
        );
        Ok(())
    }

    fn accepts(&self, workflow_type: &str) -> bool {
        let types = self.registered_types.lock().unwrap_or_else(|e| e.into_inner());
        types.is_empty() || types.contains(workflow_type)
    }
}

#[async_trait]
impl DurableEngine for InMemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    async fn start(&self, request: StartRequest) -> Result<WorkflowExecution> {
        self.start_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.start_delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failing_starts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(EngineError::Unavailable("connection refused".to_string()));
        }

        if !self.accepts(&request.workflow_type) {
            return Err(EngineError::Rejected(format!(
                "workflow type {} is not registered",
                request.workflow_type
            )));
        }

        // same id while still open: the earlier start went through
        if let Some(existing) = self.executions.get(&request.workflow_id) {
            if !existing.status.state.is_terminal() {
                return Ok(existing.status.execution.clone());
            }
        }

        let execution = WorkflowExecution::new(&request.workflow_id, Uuid::new_v4().to_string());
        let status = WorkflowStatus {
            execution: execution.clone(),
            workflow_type: request.workflow_type.clone(),
            task_queue: request.task_queue.clone(),
            state: WorkflowState::Running,
            started_at: Utc::now(),
            closed_at: None,
            result: None,
            failure: None,
        };
        self.executions.insert(
            request.workflow_id.clone(),
            Execution {
                status,
                input: request.input,
                progress: 0,
                signals: Vec::new(),
            },
        );

        info!(
            workflow_id = %execution.workflow_id,
            run_id = %execution.run_id,
            workflow_type = %request.workflow_type,
            task_queue = %request.task_queue,
            "Workflow started"
        );
        Ok(execution)
    }

    async fn signal(
        &self,
        execution: &WorkflowExecution,
        signal_name: &str,
        _payload: serde_json::Value,
    ) -> Result<()> {
        let mut entry = self.lookup(execution)?;
        match signal_name {
            "pause" => Self::transition(&mut entry, WorkflowState::Paused, "pause")?,
            "resume" => Self::transition(&mut entry, WorkflowState::Running, "resume")?,
            _ if entry.status.state.is_terminal() => {
                return Err(EngineError::InvalidState {
                    state: entry.status.state,
                    operation: format!("signal {signal_name}"),
                });
            }
            _ => {}
        }
        entry.signals.push(signal_name.to_string());
        Ok(())
    }

    async fn query(
        &self,
        execution: &WorkflowExecution,
        query_type: &str,
    ) -> Result<serde_json::Value> {
        let entry = self.lookup(execution)?;
        match query_type {
            "state" => Ok(serde_json::json!(entry.status.state)),
            "progress" => Ok(serde_json::json!({
                "progress": entry.progress,
                "state": entry.status.state,
            })),
            "signals" => Ok(serde_json::json!(entry.signals)),
            other => Err(EngineError::Rejected(format!("unknown query type: {other}"))),
        }
    }

    async fn cancel(&self, execution: &WorkflowExecution) -> Result<()> {
        let mut entry = self.lookup(execution)?;
        if entry.status.state == WorkflowState::Cancelled {
            return Ok(());
        }
        Self::transition(&mut entry, WorkflowState::Cancelled, "cancel")
    }

    async fn cancel_workflow(&self, workflow_id: &str) -> Result<()> {
        let execution = self
            .executions
            .get(workflow_id)
            .map(|e| e.status.execution.clone())
            .ok_or_else(|| EngineError::NotFound(workflow_id.to_string()))?;
        self.cancel(&execution).await
    }

    async fn status(&self, execution: &WorkflowExecution) -> Result<WorkflowStatus> {
        Ok(self.lookup(execution)?.status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> StartRequest {
        StartRequest {
            workflow_id: id.to_string(),
            workflow_type: "LongRunningAnalyticsWorkflow".to_string(),
            task_queue: "volcano-workflows".to_string(),
            input: serde_json::json!({}),
            execution_timeout: Duration::from_secs(60),
            maximum_attempts: 3,
        }
    }

    #[tokio::test]
    async fn test_start_and_status() {
        let engine = InMemoryEngine::new();
        let execution = engine.start(request("wf-1")).await.unwrap();

        let status = engine.status(&execution).await.unwrap();
        assert_eq!(status.state, WorkflowState::Running);
        assert_eq!(status.workflow_type, "LongRunningAnalyticsWorkflow");
        assert_eq!(engine.start_attempts(), 1);
    }

    #[tokio::test]
    async fn test_pause_resume_signals() {
        let engine = InMemoryEngine::new();
        let execution = engine.start(request("wf-1")).await.unwrap();

        engine
            .signal(&execution, "pause", serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(
            engine.status(&execution).await.unwrap().state,
            WorkflowState::Paused
        );

        // pausing twice is not a transition
        assert!(engine
            .signal(&execution, "pause", serde_json::Value::Null)
            .await
            .is_err());

        engine
            .signal(&execution, "resume", serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(
            engine.query(&execution, "state").await.unwrap(),
            serde_json::json!("running")
        );
    }

    #[tokio::test]
    async fn test_progress_query() {
        let engine = InMemoryEngine::new();
        let execution = engine.start(request("wf-1")).await.unwrap();
        engine.set_progress(&execution, 40).unwrap();

        let progress = engine.query(&execution, "progress").await.unwrap();
        assert_eq!(progress["progress"], 40);
        assert!(engine.query(&execution, "mood").await.is_err());
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let engine = InMemoryEngine::new();
        let execution = engine.start(request("wf-1")).await.unwrap();
        engine.complete(&execution, serde_json::json!(42)).unwrap();

        assert!(engine.cancel(&execution).await.is_err());
        assert!(engine
            .signal(&execution, "resume", serde_json::Value::Null)
            .await
            .is_err());
        let status = engine.status(&execution).await.unwrap();
        assert_eq!(status.state, WorkflowState::Completed);
        assert!(status.closed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let engine = InMemoryEngine::new();
        let execution = engine.start(request("wf-1")).await.unwrap();
        engine.cancel(&execution).await.unwrap();
        engine.cancel(&execution).await.unwrap();
        assert_eq!(
            engine.status(&execution).await.unwrap().state,
            WorkflowState::Cancelled
        );
    }

    #[tokio::test]
    async fn test_scripted_start_failures() {
        let engine = InMemoryEngine::new();
        engine.fail_next_starts(2);

        assert!(engine.start(request("wf-1")).await.unwrap_err().is_transient());
        assert!(engine.start(request("wf-1")).await.is_err());
        assert!(engine.start(request("wf-1")).await.is_ok());
        assert_eq!(engine.start_attempts(), 3);
    }

    #[tokio::test]
    async fn test_start_same_id_is_idempotent() {
        let engine = InMemoryEngine::new();
        let first = engine.start(request("wf-1")).await.unwrap();
        let second = engine.start(request("wf-1")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.execution_count(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_type_rejected() {
        let engine = InMemoryEngine::new().with_registered_types(["GitOpsWorkflow"]);
        let err = engine.start(request("wf-1")).await.unwrap_err();
        assert!(matches!(err, EngineError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_unknown_execution() {
        let engine = InMemoryEngine::new();
        let err = engine
            .status(&WorkflowExecution::new("nope", "run"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_current_run_by_workflow_id() {
        let engine = InMemoryEngine::new();
        engine.start(request("wf-1")).await.unwrap();

        engine.cancel_workflow("wf-1").await.unwrap();
        assert_eq!(engine.state_of("wf-1"), Some(WorkflowState::Cancelled));

        let err = engine.cancel_workflow("wf-2").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
