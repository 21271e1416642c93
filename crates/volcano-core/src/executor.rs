//! Fast-path executor
//!
//! Runs a plan's steps in order against one snapshot. Between steps it
//! checks the caller's cancellation token and the latency budget; the
//! session is only written when the whole plan succeeds.

use crate::error::{Error, Result};
use crate::pipeline::{as_step_ref, ExecutionPlan};
use crate::session::SessionStore;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use volcano_registry::Snapshot;
use volcano_tools::SessionContext;

/// Default fast-path latency budget
pub const DEFAULT_LATENCY_BUDGET: Duration = Duration::from_millis(100);

/// Executes plans synchronously within a latency budget
pub struct FastPathExecutor {
    sessions: SessionStore,
    budget: Duration,
}

impl Default for FastPathExecutor {
    fn default() -> Self {
        Self::new(SessionStore::default())
    }
}

impl FastPathExecutor {
    /// Create an executor over a session store
    #[must_use]
    pub fn new(sessions: SessionStore) -> Self {
        Self {
            sessions,
            budget: DEFAULT_LATENCY_BUDGET,
        }
    }

    /// Set the latency budget
    #[must_use]
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Latency budget
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Session store
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Run `plan` and return the last step's output
    ///
    /// The session's previous result is read once, before the first step,
    /// so a concurrent request on the same session cannot change it midway.
    pub fn execute(
        &self,
        plan: &ExecutionPlan,
        snapshot: &Snapshot,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        if plan.is_empty() {
            return Err(Error::Internal("empty execution plan".to_string()));
        }

        let started = Instant::now();
        let last_result = session_id.and_then(|id| self.sessions.last_result(id));
        let ctx = SessionContext::new(session_id, last_result.as_ref());
        let mut outputs: Vec<serde_json::Value> = Vec::with_capacity(plan.len());

        for (index, step) in plan.steps().iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(step = index, "Fast path cancelled");
                return Err(Error::Cancelled);
            }
            let elapsed = started.elapsed();
            if index > 0 && elapsed > self.budget {
                warn!(
                    step = index,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Latency budget exceeded"
                );
                return Err(Error::LatencyBudgetExceeded {
                    budget_ms: self.budget.as_millis() as u64,
                    elapsed_ms: elapsed.as_millis() as u64,
                });
            }

            let installed = snapshot
                .tool(&step.tool_name)
                .filter(|t| t.definition.enabled)
                .ok_or_else(|| Error::ToolNotFound(step.tool_name.clone()))?;

            let arguments = substitute(&step.arguments, &outputs)?;
            let output = installed
                .tool
                .execute(&arguments, &ctx)
                .map_err(|source| Error::ToolExecution {
                    tool: step.tool_name.clone(),
                    source,
                })?;

            debug!(step = index, tool = %step.tool_name, output = %output, "Step completed");
            outputs.push(output);
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let result = outputs
            .pop()
            .ok_or_else(|| Error::Internal("plan produced no output".to_string()))?;
        if let Some(id) = session_id {
            self.sessions.record(id, result.clone());
        }
        Ok(result)
    }
}

/// Replace `{"$step": i}` values with earlier outputs
fn substitute(value: &serde_json::Value, outputs: &[serde_json::Value]) -> Result<serde_json::Value> {
    if let Some(index) = as_step_ref(value) {
        return outputs
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("step reference #{index} is not yet available")));
    }

    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), substitute(v, outputs)?)))
            .collect::<Result<serde_json::Map<_, _>>>()
            .map(serde_json::Value::Object),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| substitute(v, outputs))
            .collect::<Result<Vec<_>>>()
            .map(serde_json::Value::Array),
        other => Ok(other.clone()),
    }
}
