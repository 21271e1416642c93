//! Configuration Watcher - change detection per branch
//!
//! The watcher keeps one revision marker per branch and reports which
//! definition files changed since that marker. It never reads content and
//! never touches snapshots; the marker only moves when the caller
//! acknowledges a change set, so a failed reload is retried on the next poll.

use crate::definition::{DefinitionFormat, DefinitionKind};
use crate::error::Result;
use crate::source::{ConfigSource, Revision};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// One changed definition file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    /// Repository-relative path
    pub path: String,
    /// What the file defines
    pub kind: DefinitionKind,
    /// Serialization format
    #[serde(skip)]
    pub format: DefinitionFormat,
}

impl Change {
    /// Classify a path; `None` for files that are not definitions
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        Some(Self {
            path: path.to_string(),
            kind: DefinitionKind::from_path(path)?,
            format: DefinitionFormat::from_path(path)?,
        })
    }
}

/// Changes on a branch between two revisions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    /// Branch the changes belong to
    pub branch: String,
    /// Previous marker (`None` on the first poll)
    pub from: Option<Revision>,
    /// Head revision the changes lead to
    pub to: Revision,
    /// Definition changes, ascending by path
    pub changes: Vec<Change>,
}

/// Polls a configuration source for changed definition files
pub struct ConfigWatcher {
    source: Arc<dyn ConfigSource>,
    markers: Mutex<HashMap<String, Revision>>,
}

impl ConfigWatcher {
    /// Create a watcher over `source`
    #[must_use]
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            markers: Mutex::new(HashMap::new()),
        }
    }

    /// The watched source
    #[must_use]
    pub fn source(&self) -> &Arc<dyn ConfigSource> {
        &self.source
    }

    /// Last acknowledged revision for `branch`
    #[must_use]
    pub fn marker(&self, branch: &str) -> Option<Revision> {
        let markers = self.markers.lock().unwrap_or_else(|e| e.into_inner());
        markers.get(branch).cloned()
    }

    /// Check `branch` for changes since the last acknowledged revision
    ///
    /// Returns `None` when the branch does not exist or head equals the marker.
    pub async fn poll(&self, branch: &str) -> Result<Option<ChangeSet>> {
        let Some(head) = self.source.current_revision(branch).await? else {
            trace!(branch = %branch, "Branch not present in source");
            return Ok(None);
        };

        let from = self.marker(branch);
        if from.as_ref() == Some(&head) {
            return Ok(None);
        }

        let paths = self.source.list_changed_paths(branch, from.as_ref()).await?;
        let mut changes: Vec<Change> = paths.iter().filter_map(|p| Change::from_path(p)).collect();
        changes.sort_by(|a, b| a.path.cmp(&b.path));

        debug!(
            branch = %branch,
            from = ?from,
            to = %head,
            paths = paths.len(),
            definitions = changes.len(),
            "Detected configuration changes"
        );

        Ok(Some(ChangeSet {
            branch: branch.to_string(),
            from,
            to: head,
            changes,
        }))
    }

    /// Move the branch marker to the change set's head revision
    pub fn acknowledge(&self, change_set: &ChangeSet) {
        let mut markers = self.markers.lock().unwrap_or_else(|e| e.into_inner());
        markers.insert(change_set.branch.clone(), change_set.to.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;

    #[test]
    fn test_change_from_path() {
        let change = Change::from_path("tools/add.json").unwrap();
        assert_eq!(change.kind, DefinitionKind::Tool);
        assert_eq!(change.format, DefinitionFormat::Json);

        assert!(Change::from_path("README.md").is_none());
        assert!(Change::from_path("tools/notes.txt").is_none());
    }

    #[tokio::test]
    async fn test_poll_first_then_incremental() {
        let source = Arc::new(InMemorySource::new());
        source.write("main", "tools/a.json", "{}");
        source.write("main", "docs/readme.md", "x");
        let watcher = ConfigWatcher::new(source.clone());

        let first = watcher.poll("main").await.unwrap().unwrap();
        assert!(first.from.is_none());
        assert_eq!(first.changes.len(), 1);
        assert_eq!(first.changes[0].path, "tools/a.json");

        // not acknowledged: the same change set comes back
        let again = watcher.poll("main").await.unwrap().unwrap();
        assert_eq!(again, first);

        watcher.acknowledge(&first);
        assert!(watcher.poll("main").await.unwrap().is_none());

        source.write("main", "workflows/w.yaml", "name: W");
        let next = watcher.poll("main").await.unwrap().unwrap();
        assert_eq!(next.from, Some(first.to.clone()));
        assert_eq!(next.changes.len(), 1);
        assert_eq!(next.changes[0].kind, DefinitionKind::Workflow);
    }

    #[tokio::test]
    async fn test_poll_missing_branch() {
        let watcher = ConfigWatcher::new(Arc::new(InMemorySource::new()));
        assert!(watcher.poll("tenant/acme").await.unwrap().is_none());
    }
}
