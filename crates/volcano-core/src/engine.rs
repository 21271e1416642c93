//! VolcanoEngine - the request entry point
//!
//! ```text
//!            ┌───────────┐   ┌────────────┐   ┌────────────┐
//! Request ──▶│ classify  │──▶│  extract   │──▶│ decompose  │
//!            └─────┬─────┘   └────────────┘   └─────┬──────┘
//!                  │ durable domain / unknown       │ plan
//!                  ▼                                ▼
//!           DurablePathAdapter ◀── too many steps ─ Router ──▶ FastPathExecutor
//! ```
//!
//! Each request reads the snapshot of its tenant's branch once and uses it
//! throughout, so a reload mid-request never mixes definitions.

use crate::durable::{DurableConfig, DurablePathAdapter, WorkflowHandle};
use crate::error::{Error, ErrorKind, Result, UserFriendlyError};
use crate::event_bus::{EventBus, VolcanoEvent};
use crate::executor::FastPathExecutor;
use crate::pipeline::{extract, Classification, Classifier, Decomposer, DEFAULT_MAX_INPUT_LENGTH};
use crate::router::{IntelligentRouter, Route, RouteDecision, RouterConfig};
use crate::session::SessionStore;
use crate::utils::EngineMetrics;
use chrono::Utc;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use volcano_durable::DurableEngine;
use volcano_registry::{Snapshot, SnapshotStore, TenantResolver, GENERAL_PURPOSE_WORKFLOW};

/// Most unloaded branches remembered between reload passes
pub const MAX_PENDING_BRANCHES: usize = 256;

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Longer requests classify as unknown
    pub max_input_length: usize,
    /// Fast-path latency budget
    pub latency_budget_ms: u64,
    /// Session inactivity TTL
    pub session_ttl_secs: u64,
    /// Router settings
    pub router: RouterConfig,
    /// Durable path settings
    pub durable: DurableConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_input_length: DEFAULT_MAX_INPUT_LENGTH,
            latency_budget_ms: 100,
            session_ttl_secs: 1800,
            router: RouterConfig::default(),
            durable: DurableConfig::default(),
        }
    }
}

/// Incoming request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Natural-language text
    pub text: String,
    /// Session for "it" / "that" continuity
    #[serde(default)]
    pub session_id: Option<String>,
    /// Tenant, for branch selection
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl Request {
    /// Create a request
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Set the session id
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the tenant id
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Outcome of a request
///
/// Fast-path successes carry `result`; durable starts carry the workflow
/// identity instead. Failures carry a sanitized `error` and its `error_kind`.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    /// Request identifier
    pub request_id: Uuid,
    /// Whether the request succeeded
    pub success: bool,
    /// Fast-path result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// User-facing error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Hint for fixing the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Whether resending may succeed
    pub retryable: bool,
    /// Path taken
    pub path: Route,
    /// Classified domain
    pub domain: String,
    /// Started workflow id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    /// Started workflow run id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

struct Completed {
    result: Option<serde_json::Value>,
    handle: Option<WorkflowHandle>,
}

/// Per-request bookkeeping filled in as the pipeline advances
struct Trace {
    path: Route,
    domain: String,
}

/// Dual-path request engine
pub struct VolcanoEngine {
    store: Arc<SnapshotStore>,
    resolver: Arc<TenantResolver>,
    classifier: Classifier,
    router: IntelligentRouter,
    executor: FastPathExecutor,
    durable: DurablePathAdapter,
    event_bus: EventBus,
    metrics: Arc<EngineMetrics>,
    pending_branches: DashSet<String>,
}

impl VolcanoEngine {
    /// Create an engine
    pub fn new(
        config: EngineConfig,
        store: Arc<SnapshotStore>,
        resolver: Arc<TenantResolver>,
        durable_engine: Arc<dyn DurableEngine>,
    ) -> Self {
        let sessions = SessionStore::new(Duration::from_secs(config.session_ttl_secs));
        let executor = FastPathExecutor::new(sessions)
            .with_budget(Duration::from_millis(config.latency_budget_ms));
        let durable = DurablePathAdapter::new(durable_engine, resolver.clone(), config.durable);

        Self {
            store,
            resolver,
            classifier: Classifier::new(config.max_input_length),
            router: IntelligentRouter::new(config.router),
            executor,
            durable,
            event_bus: EventBus::default(),
            metrics: Arc::new(EngineMetrics::new()),
            pending_branches: DashSet::new(),
        }
    }

    /// Share an existing event bus
    #[must_use]
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Share existing metrics
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Snapshot store
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Tenant resolver
    pub fn resolver(&self) -> &Arc<TenantResolver> {
        &self.resolver
    }

    /// Durable path adapter
    pub fn durable(&self) -> &DurablePathAdapter {
        &self.durable
    }

    /// Session store
    pub fn sessions(&self) -> &SessionStore {
        self.executor.sessions()
    }

    /// Event bus
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Metrics
    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Drain the branches requests resolved to that had no snapshot installed
    ///
    /// The reload supervisor loads the ones that exist in the source.
    pub fn take_pending_branches(&self) -> Vec<String> {
        let mut branches: Vec<String> = self.pending_branches.iter().map(|b| b.clone()).collect();
        for branch in &branches {
            self.pending_branches.remove(branch);
        }
        branches.sort();
        branches
    }

    /// Snapshot serving `tenant_id`
    pub fn snapshot_for(&self, tenant_id: Option<&str>) -> Arc<Snapshot> {
        let branch = self.resolver.resolve(tenant_id);
        if self.store.installed(&branch).is_none()
            && self.pending_branches.len() < MAX_PENDING_BRANCHES
        {
            self.pending_branches.insert(branch.clone());
        }
        self.store.current(&branch)
    }

    /// Drop expired sessions
    pub fn sweep_sessions(&self) -> usize {
        let removed = self.sessions().sweep();
        self.metrics.sessions.set(self.sessions().len() as i64);
        removed
    }

    /// Process one request
    ///
    /// Never fails: errors are folded into the response.
    #[tracing::instrument(skip(self, request, cancel), fields(tenant = ?request.tenant_id))]
    pub async fn process(&self, request: Request, cancel: &CancellationToken) -> Response {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        self.metrics.requests.inc();

        let mut trace = Trace {
            path: Route::Fast,
            domain: volcano_registry::definition::UNKNOWN_DOMAIN.to_string(),
        };
        let outcome = self.run(request_id, &request, cancel, &mut trace).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match trace.path {
            Route::Fast => {
                self.metrics.fast_path.inc();
                self.metrics.fast_latency.observe(started.elapsed().as_secs_f64() * 1000.0);
            }
            Route::Durable => self.metrics.durable_path.inc(),
        }
        self.metrics.sessions.set(self.sessions().len() as i64);

        let response = match outcome {
            Ok(completed) => {
                info!(
                    request_id = %request_id,
                    path = %trace.path,
                    domain = %trace.domain,
                    duration_ms,
                    "Request completed"
                );
                let (workflow_id, run_id) = completed
                    .handle
                    .map(|h| (Some(h.execution.workflow_id), Some(h.execution.run_id)))
                    .unwrap_or((None, None));
                Response {
                    request_id,
                    success: true,
                    result: completed.result,
                    error: None,
                    error_kind: None,
                    suggestion: None,
                    retryable: false,
                    path: trace.path,
                    domain: trace.domain,
                    workflow_id,
                    run_id,
                    duration_ms,
                }
            }
            Err(e) => {
                self.metrics.errors.inc();
                warn!(
                    request_id = %request_id,
                    path = %trace.path,
                    error = %e,
                    kind = %e.kind(),
                    "Request failed"
                );
                Response {
                    request_id,
                    success: false,
                    result: None,
                    error: Some(e.user_message()),
                    error_kind: Some(e.kind()),
                    suggestion: e.suggestion(),
                    retryable: e.is_retryable(),
                    path: trace.path,
                    domain: trace.domain,
                    workflow_id: None,
                    run_id: None,
                    duration_ms,
                }
            }
        };

        self.event_bus.publish(VolcanoEvent::RequestCompleted {
            request_id,
            path: response.path,
            success: response.success,
            error_kind: response.error_kind,
            duration_ms,
        });
        response
    }

    async fn run(
        &self,
        request_id: Uuid,
        request: &Request,
        cancel: &CancellationToken,
        trace: &mut Trace,
    ) -> Result<Completed> {
        if request.text.trim().is_empty() {
            return Err(Error::InvalidRequest("text must not be empty".to_string()));
        }

        let snapshot = self.snapshot_for(request.tenant_id.as_deref());
        let classification = self.classifier.classify(&request.text, &snapshot);
        trace.domain = classification.domain.clone();
        debug!(
            request_id = %request_id,
            domain = %classification.domain,
            rule = ?classification.matched_rule_id,
            "Classified request"
        );

        if let Some(decision) = self.router.route_before_planning(&classification, &snapshot) {
            trace.path = Route::Durable;
            return self
                .run_durable(request_id, request, &snapshot, &classification, &decision, cancel)
                .await;
        }

        let entities = extract(&request.text);
        let last_result = request
            .session_id
            .as_deref()
            .and_then(|id| self.sessions().last_result(id));
        let plan = Decomposer::new(&snapshot, Utc::now().date_naive()).decompose(
            &classification,
            &entities,
            last_result.as_ref(),
        )?;

        let decision = self.router.route(&classification, plan.len(), &snapshot);
        debug!(request_id = %request_id, steps = plan.len(), route = %decision.route, "Routed request");
        if decision.route == Route::Durable {
            trace.path = Route::Durable;
            return self
                .run_durable(request_id, request, &snapshot, &classification, &decision, cancel)
                .await;
        }

        let result =
            self.executor
                .execute(&plan, &snapshot, request.session_id.as_deref(), cancel)?;
        Ok(Completed {
            result: Some(result),
            handle: None,
        })
    }

    async fn run_durable(
        &self,
        request_id: Uuid,
        request: &Request,
        snapshot: &Snapshot,
        classification: &Classification,
        decision: &RouteDecision,
        cancel: &CancellationToken,
    ) -> Result<Completed> {
        let workflow_type = classification
            .target
            .as_deref()
            .filter(|target| snapshot.workflow(target).is_some())
            .or_else(|| {
                snapshot
                    .workflow_for_domain(&classification.domain)
                    .map(|w| w.name.as_str())
            })
            .unwrap_or(GENERAL_PURPOSE_WORKFLOW)
            .to_string();

        let params = serde_json::json!({
            "request_id": request_id,
            "text": request.text,
            "domain": classification.domain,
            "session_id": request.session_id,
            "tenant_id": request.tenant_id,
            "reason": decision.reason.to_string(),
        });

        let handle = self
            .durable
            .start(snapshot, &workflow_type, request.tenant_id.as_deref(), params, cancel)
            .await?;

        self.event_bus.publish(VolcanoEvent::WorkflowStarted {
            request_id,
            workflow_id: handle.execution.workflow_id.clone(),
            run_id: handle.execution.run_id.clone(),
            workflow_type: handle.workflow_type.clone(),
        });
        Ok(Completed {
            result: None,
            handle: Some(handle),
        })
    }

    /// Start a named workflow directly, bypassing classification
    pub async fn execute_workflow(
        &self,
        workflow_type: &str,
        tenant_id: Option<&str>,
        params: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<WorkflowHandle> {
        let snapshot = self.snapshot_for(tenant_id);
        let handle = self
            .durable
            .start(&snapshot, workflow_type, tenant_id, params, cancel)
            .await?;
        self.metrics.durable_path.inc();
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use volcano_durable::InMemoryEngine;
    use volcano_registry::TenantConfig;

    fn engine() -> VolcanoEngine {
        let config = TenantConfig::default();
        VolcanoEngine::new(
            EngineConfig::default(),
            Arc::new(SnapshotStore::new(config.base_branch.clone())),
            Arc::new(TenantResolver::new(config)),
            Arc::new(InMemoryEngine::new()),
        )
    }

    #[tokio::test]
    async fn test_fast_path_response() {
        let engine = engine();
        let response = engine
            .process(Request::new("Calculate 42 + 58"), &CancellationToken::new())
            .await;
        assert!(response.success);
        assert_eq!(response.result, Some(json!(100)));
        assert_eq!(response.path, Route::Fast);
        assert_eq!(response.domain, "math");
        assert_eq!(engine.metrics().snapshot().fast_path, 1);
    }

    #[tokio::test]
    async fn test_empty_text_is_invalid() {
        let response = engine()
            .process(Request::new("   "), &CancellationToken::new())
            .await;
        assert!(!response.success);
        assert_eq!(response.error_kind, Some(ErrorKind::InvalidRequest));
    }

    #[tokio::test]
    async fn test_deeply_nested_request_is_rejected() {
        let text = format!("calculate {}1 + 1", "(".repeat(5000));
        let response = engine()
            .process(Request::new(text), &CancellationToken::new())
            .await;
        assert!(!response.success);
        assert_eq!(response.error_kind, Some(ErrorKind::DecompositionError));
    }

    #[tokio::test]
    async fn test_events_published() {
        let engine = engine();
        let mut events = engine.event_bus().subscribe();
        engine
            .process(Request::new("deploy the api"), &CancellationToken::new())
            .await;

        let started = events.recv().await.unwrap();
        assert!(matches!(started, VolcanoEvent::WorkflowStarted { ref workflow_type, .. } if workflow_type == "GitOpsWorkflow"));
        let completed = events.recv().await.unwrap();
        assert!(matches!(
            completed,
            VolcanoEvent::RequestCompleted { path: Route::Durable, success: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_pending_branches() {
        let engine = engine();
        engine
            .process(Request::new("calculate 1 + 1").with_tenant("acme"), &CancellationToken::new())
            .await;
        assert_eq!(engine.take_pending_branches(), vec!["main".to_string()]);
        assert!(engine.take_pending_branches().is_empty());
    }

    #[test]
    fn test_pending_branches_are_bounded() {
        let engine = VolcanoEngine::new(
            EngineConfig::default(),
            Arc::new(SnapshotStore::default()),
            Arc::new(TenantResolver::new(
                TenantConfig::default().with_per_tenant_branches(true),
            )),
            Arc::new(InMemoryEngine::new()),
        );
        for n in 0..1000 {
            engine.snapshot_for(Some(format!("tenant-{n}").as_str()));
        }
        assert_eq!(engine.take_pending_branches().len(), MAX_PENDING_BRANCHES);
    }
}
