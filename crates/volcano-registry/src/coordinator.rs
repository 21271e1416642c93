//! Hot-Reload Coordinator - the only writer of snapshots
//!
//! A reload takes the branch's current snapshot, clones it, applies every
//! change that validates, and swaps the result in with one store insert.
//! Invalid changes are rejected individually; the rest of the batch still
//! installs. Reloads are serialized by an async mutex, while readers go
//! through the store and never wait on it.

use crate::definition::{self, DefinitionKind};
use crate::error::{Error, Result};
use crate::snapshot::Snapshot;
use crate::source::{ConfigSource, Revision};
use crate::store::SnapshotStore;
use crate::watcher::{Change, ChangeSet};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// A change that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedChange {
    /// Path of the rejected file
    pub path: String,
    /// Why it was rejected
    pub reason: String,
}

/// Outcome of one reload attempt
#[derive(Debug, Clone, Serialize)]
pub struct ReloadEvent {
    /// Branch that was reloaded
    pub branch: String,
    /// Every definition path in the change set
    pub changed_paths: Vec<String>,
    /// Paths applied to the new snapshot
    pub accepted: Vec<String>,
    /// Paths rejected, with reasons
    pub rejected: Vec<RejectedChange>,
    /// Revision of the installed snapshot
    pub revision: Revision,
    /// Wall time of the reload
    pub duration_ms: u64,
}

/// Builds and installs snapshots from change sets
pub struct HotReloadCoordinator {
    store: Arc<SnapshotStore>,
    source: Arc<dyn ConfigSource>,
    write_lock: Mutex<()>,
}

impl HotReloadCoordinator {
    /// Create a coordinator writing into `store`, reading content from `source`
    #[must_use]
    pub fn new(store: Arc<SnapshotStore>, source: Arc<dyn ConfigSource>) -> Self {
        Self {
            store,
            source,
            write_lock: Mutex::new(()),
        }
    }

    /// The store this coordinator writes to
    #[must_use]
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Apply a change set and install the resulting snapshot
    ///
    /// # Errors
    /// Only source failures abort the reload (nothing is installed); validation
    /// failures are reported in [`ReloadEvent::rejected`].
    #[instrument(skip(self, change_set), fields(branch = %change_set.branch, to = %change_set.to))]
    pub async fn reload(&self, change_set: &ChangeSet) -> Result<ReloadEvent> {
        let _guard = self.write_lock.lock().await;
        let start = Instant::now();
        let branch = change_set.branch.as_str();

        let previous = self
            .store
            .installed(branch)
            .unwrap_or_else(|| self.store.builtin());
        let mut next = (*previous).clone();

        let mut changes: Vec<&Change> = change_set.changes.iter().collect();
        changes.sort_by(|a, b| a.path.cmp(&b.path));

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for change in &changes {
            let content = self
                .source
                .read_content(branch, &change.path, &change_set.to)
                .await?;

            match apply_change(&mut next, change, content.as_deref()) {
                Ok(()) => accepted.push(change.path.clone()),
                Err(e) => {
                    warn!(path = %change.path, error = %e, "Rejected definition change");
                    rejected.push(RejectedChange {
                        path: change.path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        next.set_revision(change_set.to.clone());
        next.rebuild_rules();
        self.store.install(branch, Arc::new(next));

        let event = ReloadEvent {
            branch: branch.to_string(),
            changed_paths: changes.iter().map(|c| c.path.clone()).collect(),
            accepted,
            rejected,
            revision: change_set.to.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            accepted = event.accepted.len(),
            rejected = event.rejected.len(),
            duration_ms = event.duration_ms,
            "Reload installed"
        );

        Ok(event)
    }
}

/// Validate one change and apply it to `snapshot`
///
/// All validation happens before the first mutation, so a rejected change
/// leaves `snapshot` untouched.
fn apply_change(snapshot: &mut Snapshot, change: &Change, content: Option<&[u8]>) -> Result<()> {
    let path = change.path.as_str();

    let Some(content) = content else {
        snapshot.remove_path(path);
        return Ok(());
    };

    match change.kind {
        DefinitionKind::Tool => {
            let def = definition::parse_tool(content, change.format)?;
            ensure_owner(path, &def.name, snapshot.tool_owner(&def.name))?;
            let tool = volcano_tools::build_tool(def.clone())?;
            // a rename frees the old name owned by this path
            snapshot.remove_path(path);
            snapshot.insert_tool(def, tool, Some(path.to_string()));
        }
        DefinitionKind::Workflow => {
            let def = definition::parse_workflow(content, change.format)?;
            ensure_owner(path, &def.name, snapshot.workflow_owner(&def.name))?;
            snapshot.remove_path(path);
            snapshot.insert_workflow(def, Some(path.to_string()));
        }
        DefinitionKind::Config => {
            let values = definition::parse_config(content, change.format)?;
            snapshot.remove_path(path);
            snapshot.insert_config_file(path, values);
        }
    }
    Ok(())
}

/// A name may be owned by one path per branch; built-ins can be overridden
fn ensure_owner(path: &str, name: &str, owner: Option<Option<&str>>) -> Result<()> {
    match owner {
        Some(Some(existing)) if existing != path => Err(Error::DuplicateName {
            name: name.to_string(),
            owner: existing.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use crate::watcher::ConfigWatcher;

    fn setup() -> (Arc<InMemorySource>, ConfigWatcher, HotReloadCoordinator) {
        let source = Arc::new(InMemorySource::new());
        let store = Arc::new(SnapshotStore::new("main"));
        let watcher = ConfigWatcher::new(source.clone());
        let coordinator = HotReloadCoordinator::new(store, source.clone());
        (source, watcher, coordinator)
    }

    async fn sync(watcher: &ConfigWatcher, coordinator: &HotReloadCoordinator) -> ReloadEvent {
        let change_set = watcher.poll("main").await.unwrap().unwrap();
        let event = coordinator.reload(&change_set).await.unwrap();
        watcher.acknowledge(&change_set);
        event
    }

    #[tokio::test]
    async fn test_install_tool() {
        let (source, watcher, coordinator) = setup();
        source.write(
            "main",
            "tools/tiers.json",
            r#"{"name": "tier_lookup", "version": "1.0.0", "kind": "lookup", "domain": "tiers",
                "patterns": ["\\btier\\b"], "config": {"table": {"acme-1": "gold"}}}"#,
        );

        let event = sync(&watcher, &coordinator).await;
        assert_eq!(event.accepted, vec!["tools/tiers.json"]);
        assert!(event.rejected.is_empty());

        let snapshot = coordinator.store().current("main");
        assert!(snapshot.tool("tier_lookup").is_some());
        assert!(snapshot.rules().iter().any(|r| r.target == "tier_lookup"));
        assert_eq!(snapshot.revision(), Some(&Revision::new("r1")));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let (source, watcher, coordinator) = setup();
        let def = r#"{"name": "tier_lookup", "version": "1", "kind": "lookup", "domain": "tiers",
                "config": {"table": {}}}"#;
        source.write("main", "tools/a.json", def);
        sync(&watcher, &coordinator).await;

        source.write("main", "tools/b.json", def);
        let event = sync(&watcher, &coordinator).await;

        assert!(event.accepted.is_empty());
        assert_eq!(event.rejected.len(), 1);
        assert!(event.rejected[0].reason.contains("tools/a.json"));
    }

    #[tokio::test]
    async fn test_override_builtin_and_delete() {
        let (source, watcher, coordinator) = setup();
        source.write(
            "main",
            "tools/add.json",
            r#"{"name": "add", "version": "2.0.0", "kind": "add", "enabled": false}"#,
        );
        sync(&watcher, &coordinator).await;
        let snapshot = coordinator.store().current("main");
        assert!(!snapshot.tool("add").unwrap().definition.enabled);

        source.delete("main", "tools/add.json");
        let event = sync(&watcher, &coordinator).await;
        assert_eq!(event.accepted, vec!["tools/add.json"]);
        // removal drops the override; the built-in does not come back
        assert!(coordinator.store().current("main").tool("add").is_none());
    }

    #[tokio::test]
    async fn test_rename_frees_old_name() {
        let (source, watcher, coordinator) = setup();
        source.write(
            "main",
            "workflows/etl.json",
            r#"{"name": "EtlWorkflow", "version": "1", "domain": "etl"}"#,
        );
        sync(&watcher, &coordinator).await;

        source.write(
            "main",
            "workflows/etl.json",
            r#"{"name": "EtlWorkflowV2", "version": "2", "domain": "etl"}"#,
        );
        sync(&watcher, &coordinator).await;

        let snapshot = coordinator.store().current("main");
        assert!(snapshot.workflow("EtlWorkflow").is_none());
        assert!(snapshot.workflow("EtlWorkflowV2").is_some());
    }

    #[tokio::test]
    async fn test_source_error_installs_nothing() {
        let (source, _watcher, coordinator) = setup();
        source.write("main", "tools/a.json", "{}");

        let bogus = ChangeSet {
            branch: "main".to_string(),
            from: None,
            to: Revision::new("r42"),
            changes: vec![Change::from_path("tools/a.json").unwrap()],
        };
        assert!(coordinator.reload(&bogus).await.is_err());
        assert!(coordinator.store().installed("main").is_none());
    }
}
