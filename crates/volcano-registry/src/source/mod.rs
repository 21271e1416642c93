//! Configuration sources - the version-controlled store of definitions
//!
//! The registry only needs three things from the store: the head revision of
//! a branch, which paths changed since a revision, and a file's content at a
//! revision. Storage, replication and history live behind this trait.

mod git;
mod memory;

pub use git::GitSource;
pub use memory::InMemorySource;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque revision identifier (commit id, counter, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub String);

impl Revision {
    /// Create a revision from any string-like id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Version-controlled definition store
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Source name, for logs
    fn name(&self) -> &str;

    /// Head revision of `branch`, or `None` when the branch does not exist
    async fn current_revision(&self, branch: &str) -> Result<Option<Revision>>;

    /// Paths changed on `branch` between `since` and head
    ///
    /// With `since = None` every path present at head is listed. Deleted
    /// paths are included; reading them yields `None`.
    async fn list_changed_paths(&self, branch: &str, since: Option<&Revision>)
        -> Result<Vec<String>>;

    /// Content of `path` on `branch` at `revision`; `None` if absent there
    async fn read_content(
        &self,
        branch: &str,
        path: &str,
        revision: &Revision,
    ) -> Result<Option<Vec<u8>>>;
}
