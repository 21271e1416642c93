//! Reload supervisor - polls the configuration source and installs snapshots
//!
//! Watched branches are the resolver's known branches and every branch with
//! an installed snapshot. Branches requests resolved to without a snapshot
//! are checked against the source once per pass; only those that exist get
//! loaded and so become watched. A failure on one branch is reported and does
//! not stop the others.

use crate::engine::VolcanoEngine;
use crate::error::{Error, Result};
use crate::event_bus::VolcanoEvent;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use volcano_registry::{ConfigSource, ConfigWatcher, HotReloadCoordinator, ReloadEvent};

/// A branch whose reload failed before installing anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchFailure {
    /// Branch
    pub branch: String,
    /// Error description
    pub error: String,
}

/// Result of one pass over all watched branches
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReloadSummary {
    /// Branches that installed a new snapshot
    pub reloaded: Vec<ReloadEvent>,
    /// Branches that failed
    pub failed: Vec<BranchFailure>,
}

/// Drives watcher → coordinator for an engine's snapshot store
pub struct ReloadSupervisor {
    engine: Arc<VolcanoEngine>,
    source: Arc<dyn ConfigSource>,
    watcher: ConfigWatcher,
    coordinator: HotReloadCoordinator,
}

impl ReloadSupervisor {
    /// Create a supervisor reading from `source`
    pub fn new(engine: Arc<VolcanoEngine>, source: Arc<dyn ConfigSource>) -> Self {
        let coordinator = HotReloadCoordinator::new(engine.store().clone(), source.clone());
        Self {
            engine,
            watcher: ConfigWatcher::new(source.clone()),
            source,
            coordinator,
        }
    }

    /// Branches polled by [`Self::reload_all`]
    pub fn watched_branches(&self) -> Vec<String> {
        let mut branches = self.engine.resolver().known_branches();
        branches.extend(self.engine.store().branches());
        branches.sort();
        branches.dedup();
        branches
    }

    /// Pending branches, not yet watched, that exist in the source
    async fn discover_branches(&self, watched: &[String]) -> Vec<String> {
        let mut found = Vec::new();
        for branch in self.engine.take_pending_branches() {
            if watched.contains(&branch) {
                continue;
            }
            match self.source.current_revision(&branch).await {
                Ok(Some(_)) => found.push(branch),
                Ok(None) => debug!(branch = %branch, "Requested branch not in source"),
                Err(e) => debug!(branch = %branch, error = %e, "Could not look up requested branch"),
            }
        }
        found
    }

    /// Poll one branch and install its changes
    ///
    /// Returns `None` when the branch has no new revision.
    pub async fn reload_branch(&self, branch: &str) -> Result<Option<ReloadEvent>> {
        match self.try_reload(branch).await {
            Ok(event) => Ok(event),
            Err(e) => {
                warn!(branch = %branch, error = %e, "Reload failed");
                self.engine.metrics().reload_failures.inc();
                self.engine.event_bus().publish(VolcanoEvent::ReloadFailed {
                    branch: branch.to_string(),
                    error: e.to_string(),
                });
                Err(Error::Registry(e))
            }
        }
    }

    async fn try_reload(&self, branch: &str) -> volcano_registry::Result<Option<ReloadEvent>> {
        let Some(change_set) = self.watcher.poll(branch).await? else {
            return Ok(None);
        };

        let event = self.coordinator.reload(&change_set).await?;
        self.watcher.acknowledge(&change_set);

        let metrics = self.engine.metrics();
        metrics.reloads.inc();
        metrics.rejected_changes.inc_by(event.rejected.len() as u64);
        self.engine
            .event_bus()
            .publish(VolcanoEvent::ReloadCompleted(event.clone()));
        Ok(Some(event))
    }

    /// Poll every watched branch once
    pub async fn reload_all(&self) -> ReloadSummary {
        let mut summary = ReloadSummary::default();
        let mut branches = self.watched_branches();
        let discovered = self.discover_branches(&branches).await;
        branches.extend(discovered);

        for branch in branches {
            match self.reload_branch(&branch).await {
                Ok(Some(event)) => summary.reloaded.push(event),
                Ok(None) => {}
                Err(e) => summary.failed.push(BranchFailure {
                    branch,
                    error: e.to_string(),
                }),
            }
        }
        summary
    }

    /// Poll on a fixed interval until `token` is cancelled
    pub async fn run(self: Arc<Self>, interval: Duration, token: CancellationToken) {
        info!(interval_ms = interval.as_millis() as u64, "Reload supervisor started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let summary = self.reload_all().await;
                    if !summary.reloaded.is_empty() || !summary.failed.is_empty() {
                        debug!(
                            reloaded = summary.reloaded.len(),
                            failed = summary.failed.len(),
                            "Reload pass finished"
                        );
                    }
                }
            }
        }
        info!("Reload supervisor stopped");
    }
}
