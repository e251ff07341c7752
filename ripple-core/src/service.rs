//! Analysis service: the operations a request layer calls.
//!
//! Every request resolves its project, then loads or produces its own
//! snapshot; nothing graph-shaped is cached between requests. Generation
//! can run as a background task whose progress is polled through
//! [`AnalysisService::task`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use ripple_graphs::{Algorithm, EntryPoint};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::builder::{BuildOverrides, CallGraphBuilder};
use crate::config::RippleConfig;
use crate::diff::DiffResolver;
use crate::error::{Result, RippleError};
use crate::impact::ImpactEngine;
use crate::progress::ProgressReporter;
use crate::registry::{FileProjectRegistry, Project, ProjectRegistry};
use crate::scan::{EntryPointScanner, MainScanner};
use crate::store::{CallGraphStore, NewSnapshot, SnapshotDb, identify};
use crate::types::{
    CallGraph, DiffAnalysisResult, EntryCandidate, GenerateOutcome, GraphStatus, ImpactReport,
    ProjectIdentity, RetentionPolicy, TaskError, TaskInfo, TaskStatus,
};
use crate::vcs::{self, GitClient};
use crate::worktree::WorktreeOrchestrator;

/// What to generate. Unset fields fall back to the registered project,
/// then to the `[analysis]` config.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub path: PathBuf,
    /// Any reference `git rev-parse` accepts; HEAD when unset.
    pub commit: Option<String>,
    pub algorithm: Option<Algorithm>,
    pub entry_points: Vec<EntryPoint>,
    pub allow_fallback: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullAnalysis {
    pub diff: DiffAnalysisResult,
    pub impact: ImpactReport,
}

/// A project as seen by one request.
#[derive(Debug, Clone)]
struct ResolvedProject {
    identity: ProjectIdentity,
    /// Top of the git working tree.
    repo_root: PathBuf,
    /// Module directory relative to `repo_root`.
    subdir: PathBuf,
    registered: Option<Project>,
}

type TaskTable = Arc<Mutex<HashMap<Uuid, TaskInfo>>>;

/// Mirrors progress into the task table.
#[derive(Debug)]
struct TaskReporter {
    tasks: TaskTable,
    id: Uuid,
}

impl ProgressReporter for TaskReporter {
    fn report(&self, percent: u8, message: &str) {
        let mut tasks = self.tasks.lock().expect("task table mutex poisoned");
        if let Some(task) = tasks.get_mut(&self.id) {
            task.progress = percent.min(100);
            task.message = message.to_string();
        }
    }
}

pub struct AnalysisService {
    config: RippleConfig,
    git: GitClient,
    store: CallGraphStore,
    worktrees: WorktreeOrchestrator,
    diff: DiffResolver,
    impact: ImpactEngine,
    builder: CallGraphBuilder,
    scanner: Arc<dyn EntryPointScanner>,
    registry: Arc<dyn ProjectRegistry>,
    tasks: TaskTable,
}

impl AnalysisService {
    pub fn new(config: RippleConfig, registry: Arc<dyn ProjectRegistry>) -> Self {
        let git = GitClient::new(config.timeouts.clone());
        let retention = RetentionPolicy {
            max_count: config.storage.max_count,
            max_age_days: config.storage.max_age_days,
        };
        Self {
            store: CallGraphStore::new(config.storage.data_dir.clone(), retention),
            worktrees: WorktreeOrchestrator::new(git.clone(), config.worktree.clone()),
            diff: DiffResolver::new(git.clone()),
            impact: ImpactEngine,
            builder: CallGraphBuilder::new(config.analysis.clone()),
            scanner: Arc::new(MainScanner::new(config.analysis.exclude.clone())),
            registry,
            git,
            config,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Service with the file-backed registry at `config.registry_path()`.
    pub fn from_config(config: RippleConfig) -> Result<Self> {
        let registry = FileProjectRegistry::load(&config.registry_path())?;
        Ok(Self::new(config, Arc::new(registry)))
    }

    #[must_use]
    pub fn with_scanner(mut self, scanner: Arc<dyn EntryPointScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    /// Create worktrees under `root` instead of the system temp directory.
    #[must_use]
    pub fn with_worktree_root(mut self, root: PathBuf) -> Self {
        self.worktrees = self.worktrees.with_temp_root(root);
        self
    }

    pub fn config(&self) -> &RippleConfig {
        &self.config
    }

    pub fn store(&self) -> &CallGraphStore {
        &self.store
    }

    pub fn registry(&self) -> &Arc<dyn ProjectRegistry> {
        &self.registry
    }

    // ── Project resolution ───────────────────────────────────────

    async fn resolve_project(&self, path: &Path) -> Result<ResolvedProject> {
        if !path.is_dir() {
            return Err(RippleError::InputInvalid(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        let path = path
            .canonicalize()
            .map_err(|e| RippleError::InputInvalid(format!("{}: {e}", path.display())))?;
        let repo_root = vcs::work_dir(&path).ok_or_else(|| {
            RippleError::InputInvalid(format!("{} is not inside a git repository", path.display()))
        })?;
        let subdir = path
            .strip_prefix(&repo_root)
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut registered = self.registry.find_by_path(&path).await?;
        if registered.is_none() {
            if let Some(remote) = vcs::remote_url(&repo_root) {
                registered = self.registry.find_by_remote(&remote).await?;
            }
        }
        let identity = match &registered {
            Some(project) => ProjectIdentity {
                id: project.id.clone(),
                name: project.name.clone(),
                remote_url: project.remote_url.clone(),
            },
            None => identify(&repo_root)?,
        };
        debug!(
            project = %identity.id,
            registered = registered.is_some(),
            repo = %repo_root.display(),
            "Resolved project"
        );
        Ok(ResolvedProject {
            identity,
            repo_root,
            subdir,
            registered,
        })
    }

    /// Project id for `path`, as used by the store.
    pub async fn project_id(&self, path: &Path) -> Result<String> {
        Ok(self.resolve_project(path).await?.identity.id)
    }

    // ── Operations ───────────────────────────────────────────────

    /// Candidate entry points for RTA.
    #[instrument(skip_all, name = "scan", fields(path = %path.display()))]
    pub async fn scan(&self, path: &Path) -> Result<Vec<EntryCandidate>> {
        if !path.is_dir() {
            return Err(RippleError::InputInvalid(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        self.scanner.scan(path).await
    }

    /// Whether a graph exists for HEAD (or `target`) and how far behind it is.
    #[instrument(skip_all, name = "check_status", fields(path = %path.display()))]
    pub async fn check_status(&self, path: &Path, target: Option<&str>) -> Result<GraphStatus> {
        let project = self.resolve_project(path).await?;
        self.store
            .status(&project.identity.id, &project.repo_root, target, &self.git)
            .await
    }

    /// Start a background generation and return its task id. Poll with
    /// [`Self::task`].
    pub fn generate(self: &Arc<Self>, request: GenerateRequest) -> Result<Uuid> {
        if !request.path.is_dir() {
            return Err(RippleError::InputInvalid(format!(
                "{} is not a directory",
                request.path.display()
            )));
        }
        let id = Uuid::new_v4();
        let info = TaskInfo {
            id,
            project_path: request.path.clone(),
            commit: request.commit.clone(),
            status: TaskStatus::Pending,
            progress: 0,
            message: "Queued".to_string(),
            error: None,
            result: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.tasks
            .lock()
            .expect("task table mutex poisoned")
            .insert(id, info);

        let service = Arc::clone(self);
        tokio::spawn(async move {
            service.update_task(id, |t| t.status = TaskStatus::Running);
            let reporter: Arc<dyn ProgressReporter> = Arc::new(TaskReporter {
                tasks: Arc::clone(&service.tasks),
                id,
            });
            let outcome = service.generate_now(request, reporter).await;
            service.update_task(id, |t| {
                t.completed_at = Some(Utc::now());
                match outcome {
                    Ok(outcome) => {
                        t.status = TaskStatus::Completed;
                        t.progress = 100;
                        t.result = Some(outcome);
                    }
                    Err(e) => {
                        warn!(task = %id, code = e.code(), error = %e, "Generation task failed");
                        t.status = TaskStatus::Failed;
                        t.message = e.to_string();
                        t.error = Some(TaskError {
                            code: e.code().to_string(),
                            message: e.to_string(),
                            suggestion: e.suggestion(),
                            details: e.details(),
                        });
                    }
                }
            });
        });
        info!(task = %id, "Generation task started");
        Ok(id)
    }

    fn update_task(&self, id: Uuid, f: impl FnOnce(&mut TaskInfo)) {
        let mut tasks = self.tasks.lock().expect("task table mutex poisoned");
        if let Some(task) = tasks.get_mut(&id) {
            f(task);
        }
    }

    pub fn task(&self, id: Uuid) -> Option<TaskInfo> {
        self.tasks
            .lock()
            .expect("task table mutex poisoned")
            .get(&id)
            .cloned()
    }

    /// All known tasks, oldest first.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        let mut tasks: Vec<TaskInfo> = self
            .tasks
            .lock()
            .expect("task table mutex poisoned")
            .values()
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Build and persist a call graph, waiting for the result.
    ///
    /// A commit other than HEAD is built in a temporary worktree that is
    /// removed afterwards. Progress: 5 project, 10 worktree, 20..80 build,
    /// 80..100 store.
    #[instrument(skip_all, name = "generate", fields(path = %request.path.display()))]
    pub async fn generate_now(
        &self,
        request: GenerateRequest,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<GenerateOutcome> {
        let started = Instant::now();
        progress.report(5, "Resolving project");
        let project = self.resolve_project(&request.path).await?;
        let options = self.builder.options(self.overrides(&request, project.registered.as_ref()));
        let requested = options.algorithm;

        let reference = request
            .commit
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty() && *r != "HEAD");
        let use_worktree = match reference {
            Some(r) => !self.worktrees.is_head_commit(&project.repo_root, r).await?,
            None => false,
        };

        let (commit, branch, output) = if let Some(reference) = reference.filter(|_| use_worktree) {
            progress.report(10, "Creating worktree");
            let subdir = project.subdir.clone();
            let builder = &self.builder;
            let build_progress = Arc::clone(&progress);
            self.worktrees
                .scoped(&project.repo_root, reference, |handle| async move {
                    let root = handle.worktree_path.join(&subdir);
                    let output = builder.build(&root, options, build_progress, (20, 80)).await?;
                    Ok((handle.resolved_commit, None::<String>, output))
                })
                .await?
        } else {
            let commit = vcs::head_commit(&project.repo_root)?;
            let branch = vcs::current_branch(&project.repo_root);
            let root = project.repo_root.join(&project.subdir);
            let output = self
                .builder
                .build(&root, options, Arc::clone(&progress), (20, 80))
                .await?;
            (commit, branch, output)
        };

        let generation_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let graph = self
            .store
            .save(
                &project.identity,
                NewSnapshot {
                    commit: &commit,
                    branch,
                    output: &output,
                    generation_time_ms,
                },
                progress.as_ref(),
            )
            .await?;

        if let Some(reason) = &output.fallback_reason {
            warn!(requested = %requested, actual = %output.actual, reason = %reason, "Used fallback algorithm");
        }
        info!(
            project = %project.identity.id,
            commit = %graph.commit,
            algorithm = %output.actual,
            ms = generation_time_ms,
            "Call graph generated"
        );
        Ok(GenerateOutcome {
            graph,
            module_path: output.module_path,
            requested: output.requested,
            actual: output.actual,
            fallback: output.fallback,
            fallback_reason: output.fallback_reason,
        })
    }

    fn overrides(&self, request: &GenerateRequest, registered: Option<&Project>) -> BuildOverrides {
        let entry_points = if request.entry_points.is_empty() {
            registered.map(Project::parsed_entry_points).unwrap_or_default()
        } else {
            request.entry_points.clone()
        };
        BuildOverrides {
            algorithm: request.algorithm.or(registered.map(|p| p.algorithm)),
            entry_points,
            exclude: registered.map(|p| p.exclude.clone()),
            allow_fallback: request.allow_fallback,
        }
    }

    /// Changed functions for `commit_range`; empty or `working` means
    /// uncommitted changes.
    #[instrument(skip_all, name = "analyze_diff", fields(path = %path.display(), range = %commit_range))]
    pub async fn analyze_diff(&self, path: &Path, commit_range: &str) -> Result<DiffAnalysisResult> {
        self.diff.analyze(path, commit_range).await
    }

    /// The stored graph for `commit` (exact or prefix), or the latest one,
    /// with its snapshot database opened.
    pub async fn open_snapshot(
        &self,
        path: &Path,
        commit: Option<&str>,
    ) -> Result<(CallGraph, SnapshotDb)> {
        let project = self.resolve_project(path).await?;
        let graph = match commit {
            Some(reference) => self.store.find(&project.identity.id, reference).await?,
            None => self.store.get_latest(&project.identity.id).await?,
        };
        let db = SnapshotDb::open_existing(&graph.data_path)?;
        Ok((graph, db))
    }

    /// Bounded transitive callers of `functions` in the latest graph, or
    /// the graph of `commit`.
    #[instrument(skip_all, name = "query_impact", fields(path = %path.display(), depth = depth))]
    pub async fn query_impact(
        &self,
        path: &Path,
        commit: Option<&str>,
        functions: &[String],
        depth: i32,
    ) -> Result<ImpactReport> {
        let (_, db) = self.open_snapshot(path, commit).await?;
        self.impact.query(&db, functions, depth).await
    }

    /// Diff, then impact of every changed function against the latest
    /// graph. A diff without named functions needs no graph and yields an
    /// empty report.
    #[instrument(skip_all, name = "full_analysis", fields(path = %path.display(), range = %commit_range))]
    pub async fn full_analysis(
        &self,
        path: &Path,
        commit_range: &str,
        depth: i32,
    ) -> Result<FullAnalysis> {
        let diff = self.analyze_diff(path, commit_range).await?;
        let functions: Vec<String> = diff
            .changed_functions
            .iter()
            .filter(|f| !f.full_name.is_empty())
            .map(|f| f.full_name.clone())
            .collect();
        if functions.is_empty() {
            debug!("No changed functions, skipping impact query");
            return Ok(FullAnalysis {
                diff,
                impact: ImpactReport::default(),
            });
        }
        let impact = self.query_impact(path, None, &functions, depth).await?;
        Ok(FullAnalysis { diff, impact })
    }

    // ── History ──────────────────────────────────────────────────

    pub async fn history(&self, path: &Path) -> Result<Vec<CallGraph>> {
        let id = self.project_id(path).await?;
        self.store.list_commits(&id).await
    }

    pub async fn set_latest(&self, path: &Path, reference: &str) -> Result<CallGraph> {
        let id = self.project_id(path).await?;
        self.store.set_latest(&id, reference).await
    }

    pub async fn delete_graph(&self, path: &Path, reference: &str) -> Result<CallGraph> {
        let id = self.project_id(path).await?;
        self.store.delete_commit(&id, reference).await
    }

    /// Apply retention now; unset bounds come from `[storage]`.
    pub async fn clean_history(
        &self,
        path: &Path,
        max_count: Option<usize>,
        max_age_days: Option<u32>,
    ) -> Result<Vec<CallGraph>> {
        let id = self.project_id(path).await?;
        self.store
            .clean_old_versions(
                &id,
                max_count.unwrap_or(self.config.storage.max_count),
                max_age_days.unwrap_or(self.config.storage.max_age_days),
            )
            .await
    }
}

impl std::fmt::Debug for AnalysisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisService")
            .field("data_dir", &self.store.data_dir())
            .finish_non_exhaustive()
    }
}
