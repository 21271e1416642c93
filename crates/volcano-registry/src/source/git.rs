//! Git configuration source driving the `git` CLI

use super::{ConfigSource, Revision};
use crate::error::{Error, Result};
use crate::tenant::is_safe_branch_name;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Reads definitions from a local git repository
///
/// Branches map to `refs/heads/<branch>`; nothing is checked out, so the
/// working tree may be bare or on any branch.
#[derive(Debug, Clone)]
pub struct GitSource {
    repo: PathBuf,
}

impl GitSource {
    /// Create a source for the repository at `repo`
    #[must_use]
    pub fn new(repo: impl AsRef<Path>) -> Self {
        Self {
            repo: repo.as_ref().to_path_buf(),
        }
    }

    /// Repository path
    #[must_use]
    pub fn repo(&self) -> &Path {
        &self.repo
    }

    async fn git(&self, args: &[&str]) -> Result<Output> {
        debug!(repo = ?self.repo, ?args, "Running git");
        Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Source(format!("failed to run git: {e}")))
    }

    fn check_branch(branch: &str) -> Result<()> {
        if is_safe_branch_name(branch) {
            Ok(())
        } else {
            Err(Error::Source(format!("invalid branch name '{branch}'")))
        }
    }

    fn check_revision(revision: &Revision) -> Result<()> {
        let id = revision.as_str();
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(())
        } else {
            Err(Error::Source(format!("invalid revision '{id}'")))
        }
    }

    fn check_path(path: &str) -> Result<()> {
        if path.is_empty() || path.starts_with('-') || path.contains('\0') {
            return Err(Error::Source(format!("invalid path '{path}'")));
        }
        Ok(())
    }

    fn split_paths(stdout: &[u8]) -> Vec<String> {
        let mut paths: Vec<String> = stdout
            .split(|b| *b == 0)
            .filter(|p| !p.is_empty())
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}

#[async_trait]
impl ConfigSource for GitSource {
    fn name(&self) -> &str {
        "git"
    }

    async fn current_revision(&self, branch: &str) -> Result<Option<Revision>> {
        Self::check_branch(branch)?;
        let reference = format!("refs/heads/{branch}^{{commit}}");
        let output = self
            .git(&["rev-parse", "--verify", "--quiet", &reference])
            .await?;

        if !output.status.success() {
            return Ok(None);
        }
        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!id.is_empty()).then(|| Revision::new(id)))
    }

    async fn list_changed_paths(
        &self,
        branch: &str,
        since: Option<&Revision>,
    ) -> Result<Vec<String>> {
        let Some(head) = self.current_revision(branch).await? else {
            return Ok(Vec::new());
        };

        let output = match since {
            Some(since) => {
                Self::check_revision(since)?;
                self.git(&["diff", "--name-only", "-z", since.as_str(), head.as_str()])
                    .await?
            }
            None => {
                self.git(&["ls-tree", "-r", "--name-only", "-z", head.as_str()])
                    .await?
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Source(format!(
                "git failed listing changes on {branch}: {}",
                stderr.trim()
            )));
        }
        Ok(Self::split_paths(&output.stdout))
    }

    async fn read_content(
        &self,
        _branch: &str,
        path: &str,
        revision: &Revision,
    ) -> Result<Option<Vec<u8>>> {
        Self::check_revision(revision)?;
        Self::check_path(path)?;
        let object = format!("{revision}:{path}");

        let exists = self.git(&["cat-file", "-e", &object]).await?;
        if !exists.status.success() {
            return Ok(None);
        }

        let output = self.git(&["cat-file", "blob", &object]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Source(format!(
                "git failed reading {path}: {}",
                stderr.trim()
            )));
        }
        Ok(Some(output.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn git_available() -> bool {
        StdCommand::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = StdCommand::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap()
            .status;
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "-q", "-b", "main"]);
        git(dir.path(), &["config", "user.email", "test@example.com"]);
        git(dir.path(), &["config", "user.name", "Test"]);
        git(dir.path(), &["config", "commit.gpgsign", "false"]);
        dir
    }

    fn commit_file(dir: &Path, path: &str, content: &str, message: &str) {
        let full = dir.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, content).unwrap();
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-q", "-m", message]);
    }

    #[tokio::test]
    async fn test_git_source_lists_and_reads() {
        if !git_available() {
            return;
        }
        let dir = init_repo();
        commit_file(dir.path(), "tools/a.json", "{}", "first");
        let source = GitSource::new(dir.path());

        let r1 = source.current_revision("main").await.unwrap().unwrap();
        assert_eq!(
            source.list_changed_paths("main", None).await.unwrap(),
            vec!["tools/a.json"]
        );

        commit_file(dir.path(), "workflows/w.json", "{}", "second");
        let r2 = source.current_revision("main").await.unwrap().unwrap();
        assert_ne!(r1, r2);
        assert_eq!(
            source.list_changed_paths("main", Some(&r1)).await.unwrap(),
            vec!["workflows/w.json"]
        );

        assert_eq!(
            source.read_content("main", "tools/a.json", &r2).await.unwrap(),
            Some(b"{}".to_vec())
        );
        assert_eq!(
            source.read_content("main", "workflows/w.json", &r1).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_git_source_missing_branch() {
        if !git_available() {
            return;
        }
        let dir = init_repo();
        commit_file(dir.path(), "tools/a.json", "{}", "first");
        let source = GitSource::new(dir.path());

        assert_eq!(source.current_revision("tenant/acme").await.unwrap(), None);
        assert!(source
            .list_changed_paths("tenant/acme", None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_git_source_rejects_unsafe_input() {
        let source = GitSource::new("/nonexistent");
        assert!(source.current_revision("--upload-pack=x").await.is_err());
        assert!(source
            .read_content("main", "a.json", &Revision::new("HEAD; rm"))
            .await
            .is_err());
    }
}
