//! Isolated detached checkouts for analyzing commits other than HEAD.
//!
//! A worktree never outlives one analysis call: every failure path after
//! `git worktree add` tears it down before the error reaches the caller,
//! and a future dropped mid-analysis removes it synchronously on drop.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::WorktreeSection;
use crate::error::{Result, RippleError, VcsError};
use crate::vcs::{GitClient, run_command};

const ADD_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorktreeHandle {
    pub worktree_path: PathBuf,
    pub resolved_commit: String,
}

#[derive(Debug, Clone)]
pub struct WorktreeOrchestrator {
    git: GitClient,
    settings: WorktreeSection,
    temp_root: PathBuf,
}

/// Map a failed `rev-parse` to NotFound; timeouts stay tool failures.
pub(crate) fn resolve_error(reference: &str, err: VcsError) -> RippleError {
    match err {
        VcsError::Failed { .. } => {
            RippleError::NotFound(format!("cannot resolve '{reference}' to a commit"))
        }
        other => RippleError::Vcs(other),
    }
}

/// Removes a worktree if dropped while armed, which only happens when the
/// future that owns it is cancelled.
#[derive(Debug)]
struct TeardownGuard {
    repo: PathBuf,
    path: PathBuf,
    armed: bool,
}

impl TeardownGuard {
    fn new(repo: &Path, path: &Path) -> Self {
        Self {
            repo: repo.to_path_buf(),
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(path = %self.path.display(), "Worktree owner dropped, removing worktree");
        if self.path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %e, "Failed to delete worktree directory");
            }
        }
        let pruned = std::process::Command::new("git")
            .args(["worktree", "prune"])
            .current_dir(&self.repo)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = pruned {
            warn!(repo = %self.repo.display(), error = %e, "git worktree prune failed");
        }
    }
}

impl WorktreeOrchestrator {
    pub fn new(git: GitClient, settings: WorktreeSection) -> Self {
        Self {
            git,
            settings,
            temp_root: std::env::temp_dir(),
        }
    }

    /// Create worktrees under `root` instead of the system temp directory.
    #[must_use]
    pub fn with_temp_root(mut self, root: PathBuf) -> Self {
        self.temp_root = root;
        self
    }

    fn worktree_path(&self, commit: &str) -> PathBuf {
        let short = &commit[..commit.len().min(8)];
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        self.temp_root.join(format!(
            "{}-worktree-{short}-{}",
            self.settings.temp_prefix,
            &suffix[..6]
        ))
    }

    /// Check out `reference` into a fresh detached worktree and materialize
    /// its module dependencies.
    pub async fn create_worktree(&self, repo: &Path, reference: &str) -> Result<WorktreeHandle> {
        let commit = self
            .git
            .rev_parse(repo, reference)
            .await
            .map_err(|e| resolve_error(reference, e))?;
        let path = self.worktree_path(&commit);
        info!(
            repo = %repo.display(),
            reference = %reference,
            commit = %commit,
            path = %path.display(),
            "Creating worktree"
        );

        let guard = TeardownGuard::new(repo, &path);
        if let Err(e) = self.add_with_retry(repo, &path, &commit).await {
            self.discard(repo, &path).await;
            guard.disarm();
            return Err(e.into());
        }

        if self.settings.materialize_deps {
            if let Err(e) = self.materialize_deps(&path).await {
                warn!(path = %path.display(), error = %e, "Dependency download failed, removing worktree");
                self.discard(repo, &path).await;
                guard.disarm();
                return Err(e.into());
            }
        }

        guard.disarm();
        Ok(WorktreeHandle {
            worktree_path: path,
            resolved_commit: commit,
        })
    }

    /// `git worktree add` contends on the repository's worktree registry;
    /// lock errors are retried with a short backoff.
    async fn add_with_retry(&self, repo: &Path, path: &Path, commit: &str) -> std::result::Result<(), VcsError> {
        let mut attempt = 1;
        loop {
            match self.git.worktree_add(repo, path, commit).await {
                Ok(()) => return Ok(()),
                Err(VcsError::Failed { ref stderr, .. })
                    if attempt < ADD_ATTEMPTS && stderr.contains("lock") =>
                {
                    debug!(attempt, "Worktree registry locked, retrying");
                    tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn materialize_deps(&self, worktree: &Path) -> std::result::Result<(), VcsError> {
        let Some((program, args)) = self.settings.deps_command.split_first() else {
            return Ok(());
        };
        let Ok(module_root) = ripple_graphs::loader::find_module_root(worktree) else {
            debug!(path = %worktree.display(), "No go.mod in worktree, skipping dependency download");
            return Ok(());
        };
        run_command(program, args, &module_root, self.git.timeouts().deps)
            .await
            .map(|_| ())
    }

    /// Best-effort teardown used on failure paths.
    async fn discard(&self, repo: &Path, path: &Path) {
        if let Err(e) = self.remove_worktree(repo, path).await {
            warn!(path = %path.display(), error = %e, "Failed to discard worktree");
        }
    }

    /// Remove a worktree, falling back to deleting the directory and pruning
    /// the registry so no dead path stays referenced.
    pub async fn remove_worktree(&self, repo: &Path, path: &Path) -> Result<()> {
        match self.git.worktree_remove(repo, path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Worktree removed");
                return Ok(());
            }
            Err(e) => debug!(path = %path.display(), error = %e, "git worktree remove failed, deleting directly"),
        }
        if path.exists() {
            std::fs::remove_dir_all(path).map_err(crate::error::StoreError::Io)?;
        }
        self.git.worktree_prune(repo).await?;
        Ok(())
    }

    /// True when `reference` names the checked-out commit. Empty and `HEAD`
    /// short-circuit without running git.
    pub async fn is_head_commit(&self, repo: &Path, reference: &str) -> Result<bool> {
        let reference = reference.trim();
        if reference.is_empty() || reference == "HEAD" {
            return Ok(true);
        }
        let head = self
            .git
            .rev_parse(repo, "HEAD")
            .await
            .map_err(|e| resolve_error("HEAD", e))?;
        let target = self
            .git
            .rev_parse(repo, reference)
            .await
            .map_err(|e| resolve_error(reference, e))?;
        Ok(head == target)
    }

    /// Run `f` against a worktree of `reference`, removing the worktree
    /// afterwards whether `f` succeeds, fails or is cancelled.
    pub async fn scoped<T, F, Fut>(&self, repo: &Path, reference: &str, f: F) -> Result<T>
    where
        F: FnOnce(WorktreeHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let handle = self.create_worktree(repo, reference).await?;
        let path = handle.worktree_path.clone();
        let guard = TeardownGuard::new(repo, &path);
        let result = f(handle).await;
        self.discard(repo, &path).await;
        guard.disarm();
        result
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use super::*;

    fn git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "Test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "Test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .output()
            .expect("git command failed");
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    fn repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "--initial-branch=main"]);
        std::fs::write(dir.path().join("go.mod"), "module example.com/wt\n").unwrap();
        std::fs::write(dir.path().join("main.go"), "package main\n\nfunc main() {}\n").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-m", "first"]);
        std::fs::write(dir.path().join("extra.go"), "package main\n\nfunc extra() {}\n").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-m", "second"]);
        dir
    }

    fn orchestrator(temp_root: &Path, deps_command: &[&str], materialize: bool) -> WorktreeOrchestrator {
        let settings = WorktreeSection {
            materialize_deps: materialize,
            deps_command: deps_command.iter().map(|s| (*s).to_string()).collect(),
            temp_prefix: "ripple-test".into(),
        };
        WorktreeOrchestrator::new(GitClient::default(), settings).with_temp_root(temp_root.to_path_buf())
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn creates_detached_checkout_of_older_commit() {
        let repo = repo();
        let temp = tempfile::tempdir().unwrap();
        let wt = orchestrator(temp.path(), &["true"], true);

        let first = git(repo.path(), &["rev-parse", "HEAD~1"]);
        let handle = wt.create_worktree(repo.path(), "HEAD~1").await.unwrap();
        assert_eq!(handle.resolved_commit, first);
        assert!(handle.worktree_path.join("main.go").exists());
        assert!(!handle.worktree_path.join("extra.go").exists());
        let name = handle.worktree_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(&format!("ripple-test-worktree-{}-", &first[..8])));

        wt.remove_worktree(repo.path(), &handle.worktree_path).await.unwrap();
        assert!(!handle.worktree_path.exists());
        assert_eq!(entries(temp.path()), 0);
        let list = git(repo.path(), &["worktree", "list"]);
        assert!(!list.contains(&name));
    }

    #[tokio::test]
    async fn failed_dependency_download_leaves_nothing_behind() {
        let repo = repo();
        let temp = tempfile::tempdir().unwrap();
        let wt = orchestrator(temp.path(), &["false"], true);

        let err = wt.create_worktree(repo.path(), "HEAD~1").await.unwrap_err();
        assert_eq!(err.code(), "EXTERNAL_TOOL_FAILED");
        assert_eq!(entries(temp.path()), 0);
        assert_eq!(git(repo.path(), &["worktree", "list"]).lines().count(), 1);
    }

    #[tokio::test]
    async fn unknown_reference_is_not_found() {
        let repo = repo();
        let temp = tempfile::tempdir().unwrap();
        let wt = orchestrator(temp.path(), &[], false);

        let err = wt.create_worktree(repo.path(), "does-not-exist").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(entries(temp.path()), 0);
    }

    #[tokio::test]
    async fn removal_survives_a_deleted_registry_entry() {
        let repo = repo();
        let temp = tempfile::tempdir().unwrap();
        let wt = orchestrator(temp.path(), &[], false);

        let handle = wt.create_worktree(repo.path(), "HEAD").await.unwrap();
        // Break the registry so `git worktree remove` fails.
        let _ = std::fs::remove_file(handle.worktree_path.join(".git"));
        wt.remove_worktree(repo.path(), &handle.worktree_path).await.unwrap();
        assert!(!handle.worktree_path.exists());
    }

    #[tokio::test]
    async fn head_detection() {
        let repo = repo();
        let temp = tempfile::tempdir().unwrap();
        let wt = orchestrator(temp.path(), &[], false);
        let head = git(repo.path(), &["rev-parse", "HEAD"]);

        assert!(wt.is_head_commit(repo.path(), "").await.unwrap());
        assert!(wt.is_head_commit(repo.path(), "HEAD").await.unwrap());
        assert!(wt.is_head_commit(repo.path(), &head[..7]).await.unwrap());
        assert!(wt.is_head_commit(repo.path(), "main").await.unwrap());
        assert!(!wt.is_head_commit(repo.path(), "HEAD~1").await.unwrap());
    }

    #[tokio::test]
    async fn scoped_worktree_is_removed_on_error() {
        let repo = repo();
        let temp = tempfile::tempdir().unwrap();
        let wt = orchestrator(temp.path(), &[], false);

        let result: Result<()> = wt
            .scoped(repo.path(), "HEAD~1", |handle| async move {
                assert!(handle.worktree_path.exists());
                Err(RippleError::InputInvalid("boom".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(entries(temp.path()), 0);
    }

    #[tokio::test]
    async fn cancelled_scope_removes_worktree() {
        let repo = repo();
        let temp = tempfile::tempdir().unwrap();
        let wt = orchestrator(temp.path(), &[], false);
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();

        let scope = wt.scoped(repo.path(), "HEAD~1", move |handle| async move {
            assert!(handle.worktree_path.join("main.go").exists());
            let _ = started_tx.send(());
            std::future::pending::<Result<()>>().await
        });
        tokio::select! {
            _ = scope => panic!("scope finished without being cancelled"),
            _ = started_rx => {}
        }

        assert_eq!(entries(temp.path()), 0);
        assert_eq!(git(repo.path(), &["worktree", "list"]).lines().count(), 1);
    }
}
