//! Git access: mutating and diff-producing calls run `git` as a bounded
//! subprocess; read-only inspection (HEAD, branch, remote) goes through gix.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::config::TimeoutsSection;
use crate::error::VcsError;

/// Run `program args...` in `cwd`, killing it after `secs` seconds.
/// Returns stdout on a zero exit status.
pub async fn run_command(
    program: &str,
    args: &[String],
    cwd: &Path,
    secs: u64,
) -> Result<String, VcsError> {
    let command = std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");
    debug!(command = %command, cwd = %cwd.display(), "Running subprocess");

    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| VcsError::Spawn {
            command: command.clone(),
            source,
        })?;

    let output = tokio::time::timeout(Duration::from_secs(secs), child.wait_with_output())
        .await
        .map_err(|_| VcsError::Timeout {
            command: command.clone(),
            secs,
        })?
        .map_err(|source| VcsError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(VcsError::Failed {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Time-bounded `git` subprocesses against one repository at a time.
#[derive(Debug, Clone, Default)]
pub struct GitClient {
    timeouts: TimeoutsSection,
}

impl GitClient {
    pub fn new(timeouts: TimeoutsSection) -> Self {
        Self { timeouts }
    }

    pub fn timeouts(&self) -> &TimeoutsSection {
        &self.timeouts
    }

    async fn git(&self, repo: &Path, args: &[&str], secs: u64) -> Result<String, VcsError> {
        let args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        run_command("git", &args, repo, secs).await
    }

    /// Resolve a branch, tag, short or full hash to a full commit id.
    pub async fn rev_parse(&self, repo: &Path, reference: &str) -> Result<String, VcsError> {
        let spec = format!("{reference}^{{commit}}");
        let out = self
            .git(repo, &["rev-parse", "--verify", &spec], self.timeouts.rev_parse)
            .await?;
        Ok(out.trim().to_string())
    }

    /// Zero-context unified diff with paths relative to `repo`. `None` diffs
    /// the working tree against HEAD; `Some("a..b")`, `Some("a...b")` or
    /// `Some("ref")` go to git as one argument.
    pub async fn diff(&self, repo: &Path, range: Option<&str>) -> Result<String, VcsError> {
        let mut args = vec!["diff", "--unified=0", "--no-color", "--no-ext-diff", "--relative"];
        match range {
            Some(range) => args.push(range),
            None => args.push("HEAD"),
        }
        args.push("--");
        self.git(repo, &args, self.timeouts.diff).await
    }

    /// Number of commits in `from..to`.
    pub async fn rev_list_count(&self, repo: &Path, from: &str, to: &str) -> Result<u32, VcsError> {
        let range = format!("{from}..{to}");
        let out = self
            .git(repo, &["rev-list", "--count", &range], self.timeouts.rev_list)
            .await?;
        out.trim().parse().map_err(|_| VcsError::Failed {
            command: format!("git rev-list --count {range}"),
            status: "0".to_string(),
            stderr: format!("unexpected output: {}", out.trim()),
        })
    }

    pub async fn worktree_add(&self, repo: &Path, path: &Path, commit: &str) -> Result<(), VcsError> {
        let path = path.to_string_lossy();
        self.git(
            repo,
            &["worktree", "add", "--detach", &path, commit],
            self.timeouts.worktree_add,
        )
        .await
        .map(|_| ())
    }

    pub async fn worktree_remove(&self, repo: &Path, path: &Path) -> Result<(), VcsError> {
        let path = path.to_string_lossy();
        self.git(
            repo,
            &["worktree", "remove", "--force", &path],
            self.timeouts.worktree_remove,
        )
        .await
        .map(|_| ())
    }

    pub async fn worktree_prune(&self, repo: &Path) -> Result<(), VcsError> {
        self.git(repo, &["worktree", "prune"], self.timeouts.worktree_remove)
            .await
            .map(|_| ())
    }
}

// ── Read-only inspection ───────────────────────────────────────────

fn open(repo: &Path) -> Result<gix::Repository, VcsError> {
    gix::discover(repo).map_err(|e| VcsError::Repository(e.to_string()))
}

/// Full id of the checked-out commit.
pub fn head_commit(repo: &Path) -> Result<String, VcsError> {
    let repo = open(repo)?;
    let head = repo
        .head_commit()
        .map_err(|e| VcsError::Repository(e.to_string()))?;
    Ok(head.id().to_string())
}

/// Short name of the checked-out branch; `None` on a detached HEAD.
pub fn current_branch(repo: &Path) -> Option<String> {
    let repo = open(repo).ok()?;
    let name = repo.head_name().ok()??;
    Some(name.shorten().to_string())
}

/// URL of the default push remote, if the repository has one.
pub fn remote_url(repo: &Path) -> Option<String> {
    let repo = open(repo).ok()?;
    let remote = repo
        .find_default_remote(gix::remote::Direction::Push)?
        .ok()?;
    let url = remote.url(gix::remote::Direction::Push)?;
    Some(url.to_bstring().to_string())
}

/// Top of the working tree containing `path`; `None` outside a repository
/// or in a bare one.
pub fn work_dir(path: &Path) -> Option<PathBuf> {
    let repo = open(path).ok()?;
    let dir = repo.workdir()?;
    Some(dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf()))
}
