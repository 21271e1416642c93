//! Server initialization
//!
//! Contains the main `run()` function that starts all server components.

use super::background_tasks;
use super::config::{AppConfig, GatewayKind, SourceKind};
use super::loader::load_config;
use anyhow::{Context, Result};
use axum::{routing::get, Extension, Router};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use volcano_core::shutdown::shutdown_signal_with_controller;
use volcano_core::{ReloadSupervisor, ShutdownController, VolcanoEngine};
use volcano_durable::{DurableEngine, HttpEngine, InMemoryEngine};
use volcano_registry::{
    ConfigSource, GitSource, InMemorySource, SnapshotStore, TenantResolver,
};

/// Shared components handed to the API and the CLI
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<VolcanoEngine>,
    pub supervisor: Arc<ReloadSupervisor>,
}

impl AppState {
    /// Router with every API endpoint and the shared state attached
    pub fn router(&self) -> Router {
        Router::new()
            .merge(crate::api::api_router())
            .route("/", get(|| async { "Volcano" }))
            .layer(Extension(self.engine.clone()))
            .layer(Extension(self.supervisor.clone()))
    }
}

/// Wire source, store, resolver and durable engine, then load definitions once
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let source = build_source(config)?;

    let durable: Arc<dyn DurableEngine> = match config.gateway.kind {
        GatewayKind::Memory => Arc::new(InMemoryEngine::new()),
        GatewayKind::Http => {
            info!(base_url = %config.gateway.http.base_url, "Using HTTP workflow gateway");
            Arc::new(
                HttpEngine::new(config.gateway.http.clone())
                    .context("Failed to create workflow gateway client")?,
            )
        }
    };

    let store = Arc::new(SnapshotStore::new(config.tenants.base_branch.clone()));
    let resolver = Arc::new(TenantResolver::new(config.tenants.clone()));
    let engine = Arc::new(VolcanoEngine::new(
        config.engine.clone(),
        store,
        resolver,
        durable,
    ));
    let supervisor = Arc::new(ReloadSupervisor::new(engine.clone(), source));

    let summary = supervisor.reload_all().await;
    for failure in &summary.failed {
        warn!(branch = %failure.branch, error = %failure.error, "Initial load failed");
    }
    info!(
        reloaded = summary.reloaded.len(),
        failed = summary.failed.len(),
        "Definitions loaded"
    );

    Ok(AppState { engine, supervisor })
}

fn build_source(config: &AppConfig) -> Result<Arc<dyn ConfigSource>> {
    match config.source.kind {
        SourceKind::Memory => {
            let source = InMemorySource::new();
            if let Some(dir) = &config.source.path {
                let files = seed_memory_source(&source, dir, &config.tenants.base_branch)?;
                info!(dir = %dir.display(), files, "Seeded in-memory definitions");
            }
            Ok(Arc::new(source))
        }
        SourceKind::Git => {
            let repo = config
                .source
                .path
                .as_ref()
                .context("source.path is required for a git source")?;
            info!(repo = %repo.display(), "Using git definition source");
            Ok(Arc::new(GitSource::new(repo)))
        }
    }
}

/// Commit every file under `dir` to `branch` as one revision
pub fn seed_memory_source(source: &InMemorySource, dir: &Path, branch: &str) -> Result<usize> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    let count = files.len();
    if count > 0 {
        source.commit(branch, files.into_iter().map(|(path, content)| (path, Some(content))));
    }
    Ok(count)
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<(String, Vec<u8>)>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read definition directory {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .context("Definition file outside the seed directory")?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content = std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        out.push((relative, content));
    }
    Ok(())
}

/// Run the server
pub async fn run() -> Result<()> {
    let config = load_config()?;
    info!("Starting Volcano v{}", env!("CARGO_PKG_VERSION"));

    let state = build_state(&config).await?;
    let shutdown_controller = ShutdownController::new();

    background_tasks::start_reload_task(&config, &state.supervisor, &shutdown_controller);
    background_tasks::start_session_sweep(&config, &state.engine, &shutdown_controller);

    let app = state
        .router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    info!("HTTP server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_controller(shutdown_controller.clone()))
        .await
        .context("HTTP server error")?;

    info!("Volcano shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_definitions_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tools")).unwrap();
        std::fs::write(
            dir.path().join("tools/tiers.json"),
            r#"{"name": "tier_lookup", "version": "1.0.0", "kind": "lookup",
                "domain": "tiers", "patterns": ["\\btier\\b"],
                "config": {"table": {"enterprise-corp": "platinum"}}}"#,
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.source.path = Some(dir.path().to_path_buf());
        let state = build_state(&config).await.unwrap();

        let snapshot = state.engine.snapshot_for(None);
        assert!(snapshot.tool("tier_lookup").is_some());
        assert!(snapshot.revision().is_some());
    }

    #[tokio::test]
    async fn test_git_source_requires_path() {
        let mut config = AppConfig::default();
        config.source.kind = SourceKind::Git;
        assert!(build_state(&config).await.is_err());
    }

    #[test]
    fn test_empty_seed_dir_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = InMemorySource::new();
        assert_eq!(seed_memory_source(&source, dir.path(), "main").unwrap(), 0);
    }
}
