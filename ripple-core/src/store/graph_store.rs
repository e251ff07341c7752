//! Durable per-project call graph history.
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/<project_id>/meta.json          history, retention, latest pointer
//! <data_dir>/<project_id>/commits/<sha7>.db  one snapshot per analyzed commit
//! ```
//!
//! `meta.json` is the single source of truth. Writers are serialized per
//! project through an async `RwLock`; readers share it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use ripple_graphs::{Algorithm, BuildOutput};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Result, RippleError, StoreError};
use crate::progress::ProgressReporter;
use crate::types::{CallGraph, GraphStatus, ProjectIdentity, RetentionPolicy};
use crate::vcs::{self, GitClient};
use crate::worktree::resolve_error;

use super::schema;
use super::snapshot::SnapshotDb;

const META_FILE: &str = "meta.json";
const COMMITS_DIR: &str = "commits";

fn write_snapshot(
    path: &Path,
    snapshot: &NewSnapshot<'_>,
    created_at: DateTime<Utc>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let db = SnapshotDb::open(path)?;
    progress.report(85, "Saving function nodes");
    db.write_nodes(&snapshot.output.nodes)?;
    progress.report(90, "Saving call edges");
    db.write_edges(&snapshot.output.edges)?;
    progress.report(95, "Saving metadata");
    db.set_metadata(schema::META_COMMIT, snapshot.commit)?;
    db.set_metadata(schema::META_ALGORITHM, snapshot.output.actual.as_str())?;
    db.set_metadata(schema::META_MODULE_PATH, &snapshot.output.module_path)?;
    db.set_metadata(schema::META_CREATED_AT, &created_at.to_rfc3339())?;
    Ok(())
}

/// Delete an unfinished snapshot file and its `SQLite` sidecars.
fn remove_partial(tmp_path: &Path) {
    for suffix in ["", "-wal", "-shm", "-journal"] {
        let mut name = tmp_path.as_os_str().to_os_string();
        name.push(suffix);
        match std::fs::remove_file(&name) {
            Ok(()) => debug!(path = %tmp_path.display(), suffix, "Removed partial snapshot file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %tmp_path.display(), suffix, error = %e, "Failed to remove partial snapshot file"),
        }
    }
}

// ── Metadata document ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPointer {
    pub commit: String,
    pub data_file: String,
}

/// One analyzed commit. `data_file` is relative to the project directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub commit: String,
    #[serde(default)]
    pub branch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub func_count: usize,
    pub edge_count: usize,
    #[serde(default)]
    pub generation_time_ms: u64,
    pub algorithm: Algorithm,
    #[serde(default)]
    pub fallback: bool,
    pub data_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub latest: Option<LatestPointer>,
    #[serde(default)]
    pub retention: RetentionPolicy,
    /// Newest first.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl ProjectMeta {
    fn new(identity: &ProjectIdentity, retention: RetentionPolicy) -> Self {
        Self {
            project_id: identity.id.clone(),
            name: identity.name.clone(),
            remote_url: identity.remote_url.clone(),
            latest: None,
            retention,
            history: Vec::new(),
        }
    }

    fn point_latest_at(&mut self, entry: Option<&HistoryEntry>) {
        self.latest = entry.map(|e| LatestPointer {
            commit: e.commit.clone(),
            data_file: e.data_file.clone(),
        });
    }

    /// Keep `latest` valid after entries were removed.
    fn repair_latest(&mut self) {
        let valid = self
            .latest
            .as_ref()
            .is_some_and(|l| self.history.iter().any(|e| e.commit == l.commit));
        if !valid {
            let newest = self.history.first().cloned();
            self.point_latest_at(newest.as_ref());
        }
    }
}

// ── Identity ───────────────────────────────────────────────────────

/// Canonical form of a remote URL: lowercase, no scheme, no user, no
/// `.git` suffix, and `git@host:path` rewritten to `host/path`.
pub fn normalize_remote_url(url: &str) -> String {
    let mut url = url.trim().to_lowercase();
    if let Some((_, rest)) = url.split_once("://") {
        url = rest.to_string();
    } else if let Some((host, path)) = url.split_once(':') {
        // scp-like `user@host:path`
        if !host.contains('/') {
            url = format!("{host}/{}", path.trim_start_matches('/'));
        }
    }
    if let Some((user, rest)) = url.split_once('@') {
        if !user.contains('/') {
            url = rest.to_string();
        }
    }
    let url = url.trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);
    url.trim_end_matches('/').to_string()
}

/// Hex of the first 8 bytes of SHA-256 over `key`.
pub fn project_id(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// Identify the project containing `repo`: by normalized remote URL when
/// one is configured, else by its canonical local path.
pub fn identify(repo: &Path) -> Result<ProjectIdentity> {
    if let Some(remote) = vcs::remote_url(repo) {
        let normalized = normalize_remote_url(&remote);
        let name = normalized
            .rsplit('/')
            .next()
            .unwrap_or(&normalized)
            .to_string();
        return Ok(ProjectIdentity {
            id: project_id(&normalized),
            name,
            remote_url: Some(remote),
        });
    }
    let canonical = repo
        .canonicalize()
        .map_err(|e| RippleError::InputInvalid(format!("{}: {e}", repo.display())))?;
    let name = canonical
        .file_name()
        .map_or_else(|| "project".to_string(), |n| n.to_string_lossy().to_string());
    Ok(ProjectIdentity {
        id: project_id(&canonical.to_string_lossy()),
        name,
        remote_url: None,
    })
}

// ── Retention ──────────────────────────────────────────────────────

/// Split newest-first `history` into (kept, removed).
///
/// The kept set is the newest `max_count` entries, further restricted to
/// those younger than `max_age_days` (0 disables the age bound).
pub fn partition_retained(
    history: Vec<HistoryEntry>,
    max_count: usize,
    max_age_days: u32,
    now: DateTime<Utc>,
) -> (Vec<HistoryEntry>, Vec<HistoryEntry>) {
    let cutoff = (max_age_days > 0).then(|| now - Duration::days(i64::from(max_age_days)));
    let mut kept = Vec::new();
    let mut removed = Vec::new();
    for (rank, entry) in history.into_iter().enumerate() {
        let young = cutoff.is_none_or(|c| entry.created_at >= c);
        if rank < max_count && young {
            kept.push(entry);
        } else {
            removed.push(entry);
        }
    }
    (kept, removed)
}

fn sort_newest_first(history: &mut [HistoryEntry]) {
    history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Exact id or unambiguous-by-recency prefix: the newest entry whose
/// commit starts with `reference`.
fn find_by_prefix<'h>(history: &'h [HistoryEntry], reference: &str) -> Option<&'h HistoryEntry> {
    history
        .iter()
        .find(|e| e.commit == reference)
        .or_else(|| history.iter().find(|e| e.commit.starts_with(reference)))
}

fn check_reference(reference: &str) -> Result<&str> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(RippleError::InputInvalid("empty commit reference".into()));
    }
    Ok(reference)
}

// ── Store ──────────────────────────────────────────────────────────

/// A snapshot to persist.
#[derive(Debug)]
pub struct NewSnapshot<'a> {
    pub commit: &'a str,
    pub branch: Option<String>,
    pub output: &'a BuildOutput,
    pub generation_time_ms: u64,
}

#[derive(Debug)]
pub struct CallGraphStore {
    data_dir: PathBuf,
    retention: RetentionPolicy,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl CallGraphStore {
    pub fn new(data_dir: PathBuf, retention: RetentionPolicy) -> Self {
        Self {
            data_dir,
            retention,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.data_dir.join(project_id)
    }

    fn lock_for(&self, project_id: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().expect("project lock table poisoned");
        Arc::clone(locks.entry(project_id.to_string()).or_default())
    }

    fn read_meta(&self, project_id: &str) -> Result<Option<ProjectMeta>> {
        let path = self.project_dir(project_id).join(META_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(StoreError::Io)?;
        let mut meta: ProjectMeta = serde_json::from_str(&text).map_err(StoreError::Serialization)?;
        sort_newest_first(&mut meta.history);
        Ok(Some(meta))
    }

    /// Write via a temp file and rename so readers never see a torn file.
    fn write_meta(&self, meta: &ProjectMeta) -> Result<()> {
        let dir = self.project_dir(&meta.project_id);
        std::fs::create_dir_all(&dir).map_err(StoreError::Io)?;
        let json = serde_json::to_string_pretty(meta).map_err(StoreError::Serialization)?;
        let tmp = dir.join(format!("{META_FILE}.tmp"));
        std::fs::write(&tmp, json).map_err(StoreError::Io)?;
        std::fs::rename(&tmp, dir.join(META_FILE)).map_err(StoreError::Io)?;
        Ok(())
    }

    fn to_call_graph(&self, project_id: &str, entry: &HistoryEntry) -> CallGraph {
        CallGraph {
            project_id: project_id.to_string(),
            commit: entry.commit.clone(),
            branch: entry.branch.clone(),
            created_at: entry.created_at,
            func_count: entry.func_count,
            edge_count: entry.edge_count,
            generation_time_ms: entry.generation_time_ms,
            algorithm: entry.algorithm,
            fallback: entry.fallback,
            data_path: self.project_dir(project_id).join(&entry.data_file),
        }
    }

    fn remove_data_file(&self, project_id: &str, entry: &HistoryEntry) {
        let path = self.project_dir(project_id).join(&entry.data_file);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Removed snapshot file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove snapshot file"),
        }
    }

    fn data_file_name(meta: &ProjectMeta, commit: &str) -> String {
        let short = &commit[..commit.len().min(7)];
        let taken = meta
            .history
            .iter()
            .any(|e| e.commit != commit && e.data_file == format!("{COMMITS_DIR}/{short}.db"));
        if taken {
            format!("{COMMITS_DIR}/{commit}.db")
        } else {
            format!("{COMMITS_DIR}/{short}.db")
        }
    }

    /// Persist a built graph for `snapshot.commit`, replacing any earlier
    /// snapshot of the same commit, and make it the latest.
    ///
    /// Progress: 80 database, 85 nodes, 90 edges, 95 metadata, 100 done.
    pub async fn save(
        &self,
        identity: &ProjectIdentity,
        snapshot: NewSnapshot<'_>,
        progress: &dyn ProgressReporter,
    ) -> Result<CallGraph> {
        let lock = self.lock_for(&identity.id);
        let _guard = lock.write().await;

        let mut meta = self
            .read_meta(&identity.id)?
            .unwrap_or_else(|| ProjectMeta::new(identity, self.retention));
        meta.name.clone_from(&identity.name);
        meta.remote_url.clone_from(&identity.remote_url);
        meta.retention = self.retention;

        let data_file = Self::data_file_name(&meta, snapshot.commit);
        let project_dir = self.project_dir(&identity.id);
        std::fs::create_dir_all(project_dir.join(COMMITS_DIR)).map_err(StoreError::Io)?;
        let final_path = project_dir.join(&data_file);
        let tmp_path = final_path.with_extension("db.tmp");
        remove_partial(&tmp_path);

        progress.report(80, "Initializing call graph database");
        let created_at = Utc::now();
        let written = write_snapshot(&tmp_path, &snapshot, created_at, progress)
            .and_then(|()| std::fs::rename(&tmp_path, &final_path).map_err(|e| StoreError::Io(e).into()));
        if let Err(e) = written {
            warn!(path = %tmp_path.display(), error = %e, "Snapshot write failed, discarding");
            remove_partial(&tmp_path);
            return Err(e);
        }

        let entry = HistoryEntry {
            commit: snapshot.commit.to_string(),
            branch: snapshot.branch,
            created_at,
            func_count: snapshot.output.nodes.len(),
            edge_count: snapshot.output.edges.len(),
            generation_time_ms: snapshot.generation_time_ms,
            algorithm: snapshot.output.actual,
            fallback: snapshot.output.fallback,
            data_file,
        };
        meta.history.retain(|e| e.commit != entry.commit);
        meta.history.insert(0, entry.clone());
        sort_newest_first(&mut meta.history);
        meta.point_latest_at(Some(&entry));

        // The new entry is the newest, so it always survives.
        let history = std::mem::take(&mut meta.history);
        let (kept, removed) = partition_retained(
            history,
            self.retention.max_count.max(1),
            self.retention.max_age_days,
            created_at,
        );
        meta.history = kept;
        for old in &removed {
            self.remove_data_file(&identity.id, old);
        }
        meta.repair_latest();
        self.write_meta(&meta)?;

        info!(
            project = %identity.id,
            commit = %entry.commit,
            funcs = entry.func_count,
            edges = entry.edge_count,
            pruned = removed.len(),
            "Saved call graph"
        );
        progress.report(100, "Call graph saved");
        Ok(self.to_call_graph(&identity.id, &entry))
    }

    /// Stored graphs, newest first. Unknown projects have none.
    pub async fn list_commits(&self, project_id: &str) -> Result<Vec<CallGraph>> {
        let lock = self.lock_for(project_id);
        let _guard = lock.read().await;
        Ok(self
            .read_meta(project_id)?
            .map(|meta| {
                meta.history
                    .iter()
                    .map(|e| self.to_call_graph(project_id, e))
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn get_latest(&self, project_id: &str) -> Result<CallGraph> {
        let lock = self.lock_for(project_id);
        let _guard = lock.read().await;
        let meta = self
            .read_meta(project_id)?
            .ok_or_else(|| RippleError::NotFound(format!("no call graphs for project {project_id}")))?;
        let latest = meta
            .latest
            .as_ref()
            .and_then(|l| meta.history.iter().find(|e| e.commit == l.commit))
            .ok_or_else(|| RippleError::NotFound(format!("no latest call graph for project {project_id}")))?;
        Ok(self.to_call_graph(project_id, latest))
    }

    /// Stored graph for `reference` (exact or prefix).
    pub async fn find(&self, project_id: &str, reference: &str) -> Result<CallGraph> {
        let reference = check_reference(reference)?;
        let lock = self.lock_for(project_id);
        let _guard = lock.read().await;
        let history = self
            .read_meta(project_id)?
            .map(|meta| meta.history)
            .unwrap_or_default();
        find_by_prefix(&history, reference)
            .map(|e| self.to_call_graph(project_id, e))
            .ok_or_else(|| RippleError::NotFound(format!("no call graph for commit {reference}")))
    }

    /// Point `latest` at the entry matching `reference`. On failure the
    /// pointer is unchanged.
    pub async fn set_latest(&self, project_id: &str, reference: &str) -> Result<CallGraph> {
        let reference = check_reference(reference)?;
        let lock = self.lock_for(project_id);
        let _guard = lock.write().await;
        let mut meta = self
            .read_meta(project_id)?
            .ok_or_else(|| RippleError::NotFound(format!("no call graphs for project {project_id}")))?;
        let entry = find_by_prefix(&meta.history, reference)
            .cloned()
            .ok_or_else(|| RippleError::NotFound(format!("no call graph for commit {reference}")))?;
        meta.point_latest_at(Some(&entry));
        self.write_meta(&meta)?;
        info!(project = %project_id, commit = %entry.commit, "Latest call graph updated");
        Ok(self.to_call_graph(project_id, &entry))
    }

    /// Remove one stored graph and its data file.
    pub async fn delete_commit(&self, project_id: &str, reference: &str) -> Result<CallGraph> {
        let reference = check_reference(reference)?;
        let lock = self.lock_for(project_id);
        let _guard = lock.write().await;
        let mut meta = self
            .read_meta(project_id)?
            .ok_or_else(|| RippleError::NotFound(format!("no call graphs for project {project_id}")))?;
        let entry = find_by_prefix(&meta.history, reference)
            .cloned()
            .ok_or_else(|| RippleError::NotFound(format!("no call graph for commit {reference}")))?;
        meta.history.retain(|e| e.commit != entry.commit);
        self.remove_data_file(project_id, &entry);
        meta.repair_latest();
        self.write_meta(&meta)?;
        info!(project = %project_id, commit = %entry.commit, "Deleted call graph");
        Ok(self.to_call_graph(project_id, &entry))
    }

    /// Apply a retention bound now. Returns the removed graphs.
    pub async fn clean_old_versions(
        &self,
        project_id: &str,
        max_count: usize,
        max_age_days: u32,
    ) -> Result<Vec<CallGraph>> {
        let lock = self.lock_for(project_id);
        let _guard = lock.write().await;
        let Some(mut meta) = self.read_meta(project_id)? else {
            return Ok(Vec::new());
        };
        let history = std::mem::take(&mut meta.history);
        let (kept, removed) = partition_retained(history, max_count, max_age_days, Utc::now());
        meta.history = kept;
        for entry in &removed {
            self.remove_data_file(project_id, entry);
        }
        meta.repair_latest();
        self.write_meta(&meta)?;
        info!(
            project = %project_id,
            kept = meta.history.len(),
            removed = removed.len(),
            "Cleaned old call graphs"
        );
        Ok(removed
            .iter()
            .map(|e| self.to_call_graph(project_id, e))
            .collect())
    }

    /// Compare the stored history against HEAD or `target`.
    ///
    /// A project that was never analyzed, or whose matching snapshot file
    /// is gone, reports `exists = false` rather than an error.
    pub async fn status(
        &self,
        project_id: &str,
        repo: &Path,
        target: Option<&str>,
        git: &GitClient,
    ) -> Result<GraphStatus> {
        let head = vcs::head_commit(repo)?;
        let wanted = match target.map(str::trim) {
            None | Some("" | "HEAD") => head.clone(),
            Some(reference) => git
                .rev_parse(repo, reference)
                .await
                .map_err(|e| resolve_error(reference, e))?,
        };

        let mut status = GraphStatus {
            head_commit: Some(head.clone()),
            ..GraphStatus::default()
        };

        let lock = self.lock_for(project_id);
        let _guard = lock.read().await;
        let Some(meta) = self.read_meta(project_id)? else {
            return Ok(status);
        };
        let entry = meta.history.iter().find(|e| {
            let matches = e.commit == wanted || e.commit.starts_with(&wanted) || wanted.starts_with(&e.commit);
            matches && self.project_dir(project_id).join(&e.data_file).is_file()
        });
        let Some(entry) = entry else {
            return Ok(status);
        };

        status.exists = true;
        status.current_commit = Some(entry.commit.clone());
        status.data_path = Some(self.project_dir(project_id).join(&entry.data_file));
        status.created_at = Some(entry.created_at);
        status.func_count = Some(entry.func_count);
        status.up_to_date = entry.commit == head || head.starts_with(&entry.commit);
        if !status.up_to_date {
            status.commits_behind = match git.rev_list_count(repo, &entry.commit, &head).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(commit = %entry.commit, error = %e, "Cannot count commits behind HEAD");
                    0
                }
            };
        }
        Ok(status)
    }
}
