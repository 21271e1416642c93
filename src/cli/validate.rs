//! `volcano validate` - load a definitions directory and report rejections
//!
//! Uses the same watcher and coordinator as the server, so a directory that
//! validates here installs cleanly on reload.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use volcano_core::{EngineConfig, ReloadSupervisor, ReloadSummary, VolcanoEngine};
use volcano_durable::InMemoryEngine;
use volcano_registry::{InMemorySource, SnapshotStore, TenantConfig, TenantResolver};

use crate::server::seed_memory_source;

pub async fn run(dir: PathBuf) -> Result<()> {
    let summary = validate(&dir).await?;
    print!("{}", render(&summary));

    if !summary.failed.is_empty() || summary.reloaded.iter().any(|e| !e.rejected.is_empty()) {
        std::process::exit(1);
    }
    Ok(())
}

async fn validate(dir: &std::path::Path) -> Result<ReloadSummary> {
    let tenants = TenantConfig::default();
    let source = InMemorySource::new();
    seed_memory_source(&source, dir, &tenants.base_branch)?;

    let engine = Arc::new(VolcanoEngine::new(
        EngineConfig::default(),
        Arc::new(SnapshotStore::new(tenants.base_branch.clone())),
        Arc::new(TenantResolver::new(tenants)),
        Arc::new(InMemoryEngine::new()),
    ));
    let supervisor = ReloadSupervisor::new(engine, Arc::new(source));
    Ok(supervisor.reload_all().await)
}

fn render(summary: &ReloadSummary) -> String {
    let mut output = String::new();
    for event in &summary.reloaded {
        for path in &event.accepted {
            output.push_str(&format!("✅ {path}\n"));
        }
        for rejected in &event.rejected {
            output.push_str(&format!("❌ {}: {}\n", rejected.path, rejected.reason));
        }
    }
    for failure in &summary.failed {
        output.push_str(&format!("❌ {}: {}\n", failure.branch, failure.error));
    }
    if output.is_empty() {
        output.push_str("No definitions found\n");
    }
    output
}
