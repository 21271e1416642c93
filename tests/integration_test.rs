//! Integration tests for Volcano
//!
//! These tests drive definitions from a configuration source through reload
//! and into request handling:
//! - volcano-registry: source, watcher, coordinator, tenant branches
//! - volcano-core: engine, router, reload supervisor
//! - volcano-durable: in-memory engine

use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use volcano_core::{EngineConfig, ReloadSupervisor, Request, Route, VolcanoEngine};
use volcano_durable::InMemoryEngine;
use volcano_registry::{InMemorySource, SnapshotStore, TenantConfig, TenantResolver};

struct Harness {
    source: Arc<InMemorySource>,
    engine: Arc<VolcanoEngine>,
    durable: Arc<InMemoryEngine>,
    supervisor: ReloadSupervisor,
}

impl Harness {
    fn new(tenants: TenantConfig) -> Self {
        let source = Arc::new(InMemorySource::new());
        let durable = Arc::new(InMemoryEngine::new());
        let engine = Arc::new(VolcanoEngine::new(
            EngineConfig::default(),
            Arc::new(SnapshotStore::new(tenants.base_branch.clone())),
            Arc::new(TenantResolver::new(tenants)),
            durable.clone(),
        ));
        let supervisor = ReloadSupervisor::new(engine.clone(), source.clone());
        Self {
            source,
            engine,
            durable,
            supervisor,
        }
    }

    async fn ask(&self, text: &str, tenant: Option<&str>) -> volcano_core::Response {
        let mut request = Request::new(text);
        if let Some(tenant) = tenant {
            request = request.with_tenant(tenant);
        }
        self.engine.process(request, &CancellationToken::new()).await
    }
}

const TIERS: &str = r#"{"name": "tier_lookup", "version": "1.0.0", "kind": "lookup",
    "domain": "tiers", "patterns": ["\\btier\\b"],
    "config": {"table": {"enterprise-corp": "platinum"}}}"#;

// ============================================================================
// Hot reload
// ============================================================================

#[tokio::test]
async fn test_router_threshold_follows_reloaded_config() {
    let harness = Harness::new(TenantConfig::default());
    let text = "calculate 1 + 2 + 3 + 4";

    assert_eq!(harness.ask(text, None).await.path, Route::Fast);

    harness
        .source
        .write("main", "config/router.toml", "[router]\nmax_fast_steps = 2\n");
    let summary = harness.supervisor.reload_all().await;
    assert_eq!(summary.reloaded.len(), 1);

    let response = harness.ask(text, None).await;
    assert_eq!(response.path, Route::Durable);
    assert!(response
        .workflow_id
        .unwrap()
        .starts_with("GeneralPurposeWorkflow-"));
}

#[tokio::test]
async fn test_durable_domains_from_config() {
    let harness = Harness::new(TenantConfig::default());
    harness.source.write(
        "main",
        "config/router.toml",
        "[router]\ndurable_domains = [\"math\"]\n",
    );
    harness.supervisor.reload_all().await;

    let response = harness.ask("calculate 2 + 2", None).await;
    assert!(response.success);
    assert_eq!(response.path, Route::Durable);
    assert_eq!(response.domain, "math");
}

#[tokio::test]
async fn test_new_workflow_definition_is_routable() {
    let harness = Harness::new(TenantConfig::default());
    harness.source.write(
        "main",
        "workflows/billing.json",
        r#"{"name": "BillingWorkflow", "version": "1.0.0", "domain": "billing",
            "patterns": ["\\binvoice\\b"], "stages": ["draft", "send"]}"#,
    );
    harness.supervisor.reload_all().await;

    let response = harness.ask("send the invoice to globex", None).await;
    assert_eq!(response.path, Route::Durable);
    assert_eq!(response.domain, "billing");
    let workflow_id = response.workflow_id.unwrap();
    assert!(workflow_id.starts_with("BillingWorkflow-default-"));
    assert_eq!(harness.durable.execution_count(), 1);
}

#[tokio::test]
async fn test_partial_batch_serves_valid_definitions() {
    let harness = Harness::new(TenantConfig::default());
    harness.source.commit(
        "main",
        [
            ("tools/tiers.json", Some(TIERS.as_bytes().to_vec())),
            ("tools/broken.json", Some(b"{ not json".to_vec())),
            (
                "config/router.toml",
                Some(b"[router]\nmax_fast_steps = 4\n".to_vec()),
            ),
        ],
    );

    let summary = harness.supervisor.reload_all().await;
    let event = &summary.reloaded[0];
    assert_eq!(event.accepted.len(), 2);
    assert_eq!(event.rejected.len(), 1);
    assert_eq!(event.rejected[0].path, "tools/broken.json");

    let response = harness.ask("What tier is enterprise-corp?", None).await;
    assert_eq!(response.result, Some(json!("platinum")));
    assert_eq!(response.path, Route::Fast);
}

// ============================================================================
// Tenants
// ============================================================================

#[tokio::test]
async fn test_tenant_branch_isolation() {
    let harness = Harness::new(TenantConfig::default().with_per_tenant_branches(true));

    // resolve once so the next reload pass looks the tenant branch up
    harness.ask("calculate 1 + 1", Some("acme")).await;
    harness.source.write("tenant/acme", "tools/tiers.json", TIERS);
    harness.supervisor.reload_all().await;

    let acme = harness.ask("What tier is enterprise-corp?", Some("acme")).await;
    assert_eq!(acme.result, Some(json!("platinum")));

    // other tenants fall back to the base branch, which has no tier tool
    let globex = harness.ask("What tier is enterprise-corp?", Some("globex")).await;
    assert_eq!(globex.path, Route::Durable);
    assert!(globex.result.is_none());
}

#[tokio::test]
async fn test_override_branch_is_watched_before_first_request() {
    let harness = Harness::new(TenantConfig::default().with_override("globex", "customers/globex"));
    harness
        .source
        .write("customers/globex", "tools/tiers.json", TIERS);

    let summary = harness.supervisor.reload_all().await;
    assert_eq!(summary.reloaded.len(), 1);
    assert_eq!(summary.reloaded[0].branch, "customers/globex");

    let response = harness.ask("What tier is enterprise-corp?", Some("globex")).await;
    assert_eq!(response.result, Some(json!("platinum")));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_during_reload() {
    let harness = Arc::new(Harness::new(TenantConfig::default()));

    let mut readers = Vec::new();
    for i in 0..8u64 {
        let harness = harness.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let response = harness
                    .ask(&format!("calculate {i} + 1"), None)
                    .await;
                assert_eq!(response.result, Some(json!(i + 1)));
            }
        }));
    }

    harness.source.write("main", "tools/tiers.json", TIERS);
    harness.supervisor.reload_all().await;

    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(harness.engine.metrics().snapshot().requests, 400);
}
