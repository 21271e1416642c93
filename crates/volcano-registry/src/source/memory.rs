//! In-memory configuration source with linear per-branch history

use super::{ConfigSource, Revision};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

/// One commit: path → new content (`None` deletes the path)
type Commit = (Revision, BTreeMap<String, Option<Vec<u8>>>);

/// Configuration source backed by process memory
///
/// Revisions are `r1`, `r2`, ... per branch. Useful for development, tests
/// and for seeding a server without a git checkout.
#[derive(Debug, Default)]
pub struct InMemorySource {
    branches: Mutex<HashMap<String, Vec<Commit>>>,
}

impl InMemorySource {
    /// Create an empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a set of changes to `branch`, returning the new revision
    ///
    /// `None` content deletes the path. The branch is created on first commit.
    pub fn commit<I, P>(&self, branch: &str, changes: I) -> Revision
    where
        I: IntoIterator<Item = (P, Option<Vec<u8>>)>,
        P: Into<String>,
    {
        let mut branches = self.branches.lock().unwrap_or_else(|e| e.into_inner());
        let history = branches.entry(branch.to_string()).or_default();
        let revision = Revision::new(format!("r{}", history.len() + 1));
        let changes = changes.into_iter().map(|(p, c)| (p.into(), c)).collect();
        history.push((revision.clone(), changes));
        revision
    }

    /// Commit a single file write
    pub fn write(&self, branch: &str, path: &str, content: impl Into<Vec<u8>>) -> Revision {
        self.commit(branch, [(path, Some(content.into()))])
    }

    /// Commit a single file deletion
    pub fn delete(&self, branch: &str, path: &str) -> Revision {
        self.commit(branch, [(path, None)])
    }

    fn position(history: &[Commit], revision: &Revision) -> Result<usize> {
        history
            .iter()
            .position(|(r, _)| r == revision)
            .ok_or_else(|| Error::Source(format!("unknown revision {revision}")))
    }
}

#[async_trait]
impl ConfigSource for InMemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn current_revision(&self, branch: &str) -> Result<Option<Revision>> {
        let branches = self.branches.lock().unwrap_or_else(|e| e.into_inner());
        Ok(branches
            .get(branch)
            .and_then(|history| history.last())
            .map(|(revision, _)| revision.clone()))
    }

    async fn list_changed_paths(
        &self,
        branch: &str,
        since: Option<&Revision>,
    ) -> Result<Vec<String>> {
        let branches = self.branches.lock().unwrap_or_else(|e| e.into_inner());
        let Some(history) = branches.get(branch) else {
            return Ok(Vec::new());
        };

        let paths: BTreeSet<&String> = match since {
            Some(since) => {
                let start = Self::position(history, since)? + 1;
                history[start..]
                    .iter()
                    .flat_map(|(_, changes)| changes.keys())
                    .collect()
            }
            None => {
                // every path alive at head
                let mut alive: BTreeMap<&String, bool> = BTreeMap::new();
                for (_, changes) in history {
                    for (path, content) in changes {
                        alive.insert(path, content.is_some());
                    }
                }
                alive
                    .into_iter()
                    .filter_map(|(path, live)| live.then_some(path))
                    .collect()
            }
        };

        Ok(paths.into_iter().cloned().collect())
    }

    async fn read_content(
        &self,
        branch: &str,
        path: &str,
        revision: &Revision,
    ) -> Result<Option<Vec<u8>>> {
        let branches = self.branches.lock().unwrap_or_else(|e| e.into_inner());
        let history = branches
            .get(branch)
            .ok_or_else(|| Error::Source(format!("unknown branch {branch}")))?;
        let end = Self::position(history, revision)?;

        Ok(history[..=end]
            .iter()
            .rev()
            .find_map(|(_, changes)| changes.get(path))
            .cloned()
            .flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_and_read() {
        let source = InMemorySource::new();
        let r1 = source.write("main", "tools/a.json", "one");
        let r2 = source.write("main", "tools/a.json", "two");

        assert_eq!(source.current_revision("main").await.unwrap(), Some(r2.clone()));
        assert_eq!(
            source.read_content("main", "tools/a.json", &r1).await.unwrap(),
            Some(b"one".to_vec())
        );
        assert_eq!(
            source.read_content("main", "tools/a.json", &r2).await.unwrap(),
            Some(b"two".to_vec())
        );
        assert_eq!(
            source.read_content("main", "tools/b.json", &r2).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_changed_paths() {
        let source = InMemorySource::new();
        let r1 = source.commit(
            "main",
            [
                ("tools/a.json", Some(b"a".to_vec())),
                ("tools/b.json", Some(b"b".to_vec())),
            ],
        );
        source.delete("main", "tools/a.json");
        source.write("main", "workflows/w.json", "w");

        let all = source.list_changed_paths("main", None).await.unwrap();
        assert_eq!(all, vec!["tools/b.json", "workflows/w.json"]);

        let since = source.list_changed_paths("main", Some(&r1)).await.unwrap();
        assert_eq!(since, vec!["tools/a.json", "workflows/w.json"]);
    }

    #[tokio::test]
    async fn test_deleted_path_reads_none() {
        let source = InMemorySource::new();
        source.write("main", "tools/a.json", "a");
        let r2 = source.delete("main", "tools/a.json");

        assert_eq!(
            source.read_content("main", "tools/a.json", &r2).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_unknown_branch_and_revision() {
        let source = InMemorySource::new();
        assert_eq!(source.current_revision("tenant/acme").await.unwrap(), None);
        assert!(source
            .list_changed_paths("tenant/acme", None)
            .await
            .unwrap()
            .is_empty());

        source.write("main", "tools/a.json", "a");
        assert!(source
            .list_changed_paths("main", Some(&Revision::new("r99")))
            .await
            .is_err());
    }
}
