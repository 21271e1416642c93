//! Durable-path adapter
//!
//! Starts workflows on the configured [`DurableEngine`] and mirrors their
//! state. Starts are retried with backoff on transient engine errors; the
//! workflow id is fixed before the first attempt so a start that reached the
//! engine but lost its reply is not duplicated.
//!
//! A start abandoned mid-flight, by the caller's token or by dropping the
//! future, is followed by a detached cancel of that workflow id, so the
//! engine is never left running a workflow nobody mirrors.

use crate::error::{Error, Result};
use crate::utils::{retry_with_backoff, RetryConfig, RetryError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use volcano_durable::{
    DurableEngine, EngineError, StartRequest, WorkflowExecution, WorkflowState, WorkflowStatus,
};
use volcano_registry::{Snapshot, TenantResolver};

/// Durable path settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurableConfig {
    /// Per-attempt timeout for a workflow start
    pub start_timeout_ms: u64,
    /// Retry policy for workflow starts
    pub retry: RetryConfig,
    /// How long a closed workflow stays mirrored before the sweep drops it
    pub handle_retention_secs: u64,
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            start_timeout_ms: 5000,
            retry: RetryConfig::default(),
            handle_retention_secs: 3600,
        }
    }
}

/// Mirror of a started workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowHandle {
    /// Execution identity
    #[serde(flatten)]
    pub execution: WorkflowExecution,
    /// Workflow type
    pub workflow_type: String,
    /// Task queue it was started on
    pub task_queue: String,
    /// Tenant that started it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Last state seen from the engine
    pub status: WorkflowState,
    /// When the start was acknowledged
    pub started_at: DateTime<Utc>,
    /// When a terminal state was first seen
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

/// Cancels a start that may have reached the engine, unless disarmed
struct PendingStart {
    engine: Arc<dyn DurableEngine>,
    workflow_id: Option<String>,
}

impl PendingStart {
    fn new(engine: Arc<dyn DurableEngine>, workflow_id: &str) -> Self {
        Self {
            engine,
            workflow_id: Some(workflow_id.to_string()),
        }
    }

    fn disarm(mut self) {
        self.workflow_id = None;
    }
}

impl Drop for PendingStart {
    fn drop(&mut self) {
        let Some(workflow_id) = self.workflow_id.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%workflow_id, "No runtime left to cancel an abandoned workflow start");
            return;
        };
        let engine = self.engine.clone();
        // detached: the caller's future may already be gone
        runtime.spawn(async move {
            match engine.cancel_workflow(&workflow_id).await {
                Ok(()) => info!(%workflow_id, "Cancelled workflow whose start was abandoned"),
                Err(EngineError::NotFound(_)) => {
                    debug!(%workflow_id, "Abandoned start never reached the engine");
                }
                Err(e) => {
                    warn!(%workflow_id, error = %e, "Failed to cancel abandoned workflow start");
                }
            }
        });
    }
}

fn start_error(request: &StartRequest, e: RetryError<EngineError>) -> Error {
    warn!(
        workflow_id = %request.workflow_id,
        attempts = e.attempts,
        error = %e.last_error,
        "Workflow start failed"
    );
    match e.last_error {
        EngineError::Rejected(reason) => Error::WorkflowStartRejected {
            workflow_type: request.workflow_type.clone(),
            reason,
        },
        err if err.is_transient() => Error::DurablePathUnavailable {
            attempts: e.attempts,
            last_error: err.to_string(),
        },
        other => Error::from_engine(other),
    }
}

/// Adapter between Volcano and the durable engine
pub struct DurablePathAdapter {
    engine: Arc<dyn DurableEngine>,
    resolver: Arc<TenantResolver>,
    config: DurableConfig,
    handles: DashMap<String, WorkflowHandle>,
}

impl DurablePathAdapter {
    /// Create an adapter
    pub fn new(
        engine: Arc<dyn DurableEngine>,
        resolver: Arc<TenantResolver>,
        config: DurableConfig,
    ) -> Self {
        Self {
            engine,
            resolver,
            config,
            handles: DashMap::new(),
        }
    }

    /// Start `workflow_type` as installed in `snapshot`
    pub async fn start(
        &self,
        snapshot: &Snapshot,
        workflow_type: &str,
        tenant_id: Option<&str>,
        params: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<WorkflowHandle> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let definition = snapshot
            .workflow(workflow_type)
            .ok_or_else(|| Error::WorkflowNotFound(workflow_type.to_string()))?;

        let request = StartRequest {
            workflow_id: format!(
                "{}-{}-{}",
                definition.name,
                tenant_id.unwrap_or("default"),
                Uuid::new_v4()
            ),
            workflow_type: definition.name.clone(),
            task_queue: self
                .resolver
                .task_queue_for(&definition.task_queue, tenant_id),
            input: params,
            execution_timeout: definition.execution_timeout(),
            maximum_attempts: definition.configuration.retry_policy.maximum_attempts,
        };

        let timeout_ms = self.config.start_timeout_ms;
        let engine = &self.engine;
        let attempt = || {
            let request = request.clone();
            async move {
                tokio::time::timeout(Duration::from_millis(timeout_ms), engine.start(request))
                    .await
                    .unwrap_or_else(|_| Err(EngineError::Timeout(timeout_ms)))
            }
        };

        let pending = PendingStart::new(self.engine.clone(), &request.workflow_id);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(workflow_id = %request.workflow_id, "Workflow start cancelled");
                return Err(Error::Cancelled);
            }
            outcome = retry_with_backoff(&self.config.retry, attempt, EngineError::is_transient) => outcome,
        };

        let execution = match outcome {
            Ok(execution) => execution,
            Err(e) => {
                pending.disarm();
                return Err(start_error(&request, e));
            }
        };

        // the guard stays armed until this cancel has been sent
        if cancel.is_cancelled() {
            if let Err(e) = self.engine.cancel(&execution).await {
                warn!(workflow_id = %execution.workflow_id, error = %e, "Failed to cancel workflow after caller cancellation");
            }
            pending.disarm();
            return Err(Error::Cancelled);
        }
        pending.disarm();

        let handle = WorkflowHandle {
            execution,
            workflow_type: request.workflow_type,
            task_queue: request.task_queue,
            tenant_id: tenant_id.map(str::to_string),
            status: WorkflowState::Running,
            started_at: Utc::now(),
            closed_at: None,
        };
        info!(
            workflow_id = %handle.execution.workflow_id,
            run_id = %handle.execution.run_id,
            workflow_type = %handle.workflow_type,
            task_queue = %handle.task_queue,
            "Workflow started"
        );
        self.handles
            .insert(handle.execution.workflow_id.clone(), handle.clone());
        Ok(handle)
    }

    fn execution(&self, workflow_id: &str) -> Result<WorkflowExecution> {
        self.handles
            .get(workflow_id)
            .map(|h| h.execution.clone())
            .ok_or_else(|| Error::WorkflowNotFound(workflow_id.to_string()))
    }

    async fn refresh(&self, execution: &WorkflowExecution) -> Result<WorkflowStatus> {
        let status = self
            .engine
            .status(execution)
            .await
            .map_err(Error::from_engine)?;
        if let Some(mut handle) = self.handles.get_mut(&execution.workflow_id) {
            handle.status = status.state;
            if status.state.is_terminal() && handle.closed_at.is_none() {
                handle.closed_at = Some(status.closed_at.unwrap_or_else(Utc::now));
            }
        }
        Ok(status)
    }

    /// Send a signal; `pause` and `resume` are checked against the mirrored state first
    pub async fn signal(
        &self,
        workflow_id: &str,
        signal_name: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let execution = self.execution(workflow_id)?;
        let target = match signal_name {
            "pause" => Some(WorkflowState::Paused),
            "resume" => Some(WorkflowState::Running),
            _ => None,
        };

        if let Some(next) = target {
            let current = self.refresh(&execution).await?.state;
            if !current.can_transition_to(next) {
                return Err(Error::InvalidState {
                    state: current,
                    operation: signal_name.to_string(),
                });
            }
        }

        self.engine
            .signal(&execution, signal_name, payload)
            .await
            .map_err(Error::from_engine)?;

        if let Some(next) = target {
            if let Some(mut handle) = self.handles.get_mut(workflow_id) {
                handle.status = next;
            }
        }
        debug!(workflow_id, signal = signal_name, "Signal delivered");
        Ok(())
    }

    /// Run a read-only query
    pub async fn query(&self, workflow_id: &str, query_type: &str) -> Result<serde_json::Value> {
        let execution = self.execution(workflow_id)?;
        self.engine
            .query(&execution, query_type)
            .await
            .map_err(Error::from_engine)
    }

    /// Request cancellation
    pub async fn cancel(&self, workflow_id: &str) -> Result<()> {
        let execution = self.execution(workflow_id)?;
        self.engine
            .cancel(&execution)
            .await
            .map_err(Error::from_engine)?;
        self.refresh(&execution).await?;
        info!(workflow_id, "Workflow cancelled");
        Ok(())
    }

    /// Engine status, refreshing the mirror
    pub async fn status(&self, workflow_id: &str) -> Result<WorkflowStatus> {
        let execution = self.execution(workflow_id)?;
        self.refresh(&execution).await
    }

    /// Final result; `None` while the workflow is still open
    pub async fn result(&self, workflow_id: &str) -> Result<Option<serde_json::Value>> {
        let status = self.status(workflow_id).await?;
        match status.state {
            WorkflowState::Completed => Ok(Some(status.result.unwrap_or(serde_json::Value::Null))),
            WorkflowState::Failed => Err(Error::WorkflowFailed {
                workflow_id: workflow_id.to_string(),
                reason: status.failure.unwrap_or_else(|| "unknown failure".to_string()),
            }),
            WorkflowState::Cancelled => Err(Error::Cancelled),
            WorkflowState::Running | WorkflowState::Paused => Ok(None),
        }
    }

    /// Mirrored handle
    pub fn handle(&self, workflow_id: &str) -> Option<WorkflowHandle> {
        self.handles.get(workflow_id).map(|h| h.clone())
    }

    /// Drop handles closed longer than the retention period
    ///
    /// Returns how many were dropped. Open workflows are never dropped.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let retention = Duration::from_secs(self.config.handle_retention_secs);
        let before = self.handles.len();
        self.handles.retain(|_, handle| match handle.closed_at {
            // a close time in the future (clock skew) counts as fresh
            Some(closed_at) => now
                .signed_duration_since(closed_at)
                .to_std()
                .map_or(true, |age| age < retention),
            None => true,
        });
        let removed = before.saturating_sub(self.handles.len());
        if removed > 0 {
            debug!(removed, "Swept closed workflow handles");
        }
        removed
    }

    /// All mirrored handles, oldest first
    pub fn handles(&self) -> Vec<WorkflowHandle> {
        let mut handles: Vec<_> = self.handles.iter().map(|h| h.clone()).collect();
        handles.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.execution.workflow_id.cmp(&b.execution.workflow_id))
        });
        handles
    }
}
