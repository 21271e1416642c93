//! Snapshot store - the per-branch "current snapshot" pointer
//!
//! Readers clone an `Arc<Snapshot>` out of the map and keep using it for the
//! rest of their request, so a swap never affects work already in flight.

use crate::snapshot::Snapshot;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Current snapshot per branch
#[derive(Debug)]
pub struct SnapshotStore {
    snapshots: DashMap<String, Arc<Snapshot>>,
    base_branch: String,
    builtin: Arc<Snapshot>,
}

impl SnapshotStore {
    /// Create a store whose fallback chain ends at `base_branch`, then the built-ins
    #[must_use]
    pub fn new(base_branch: impl Into<String>) -> Self {
        Self {
            snapshots: DashMap::new(),
            base_branch: base_branch.into(),
            builtin: Arc::new(Snapshot::builtin()),
        }
    }

    /// Base branch
    #[must_use]
    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    /// Current snapshot for `branch`
    ///
    /// Falls back to the base branch, then to the built-in snapshot.
    #[must_use]
    pub fn current(&self, branch: &str) -> Arc<Snapshot> {
        self.installed(branch)
            .or_else(|| self.installed(&self.base_branch))
            .unwrap_or_else(|| Arc::clone(&self.builtin))
    }

    /// Snapshot installed for exactly `branch`, without fallback
    #[must_use]
    pub fn installed(&self, branch: &str) -> Option<Arc<Snapshot>> {
        self.snapshots.get(branch).map(|entry| Arc::clone(entry.value()))
    }

    /// The built-in snapshot
    #[must_use]
    pub fn builtin(&self) -> Arc<Snapshot> {
        Arc::clone(&self.builtin)
    }

    /// Branches with an installed snapshot (sorted)
    #[must_use]
    pub fn branches(&self) -> Vec<String> {
        let mut branches: Vec<String> = self.snapshots.iter().map(|e| e.key().clone()).collect();
        branches.sort();
        branches
    }

    /// Swap in a new snapshot for `branch`
    pub(crate) fn install(&self, branch: &str, snapshot: Arc<Snapshot>) {
        debug!(
            branch = %branch,
            revision = ?snapshot.revision(),
            tools = snapshot.tools().len(),
            "Installing snapshot"
        );
        self.snapshots.insert(branch.to_string(), snapshot);
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new("main")
    }
}
