use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ripple_graphs::Algorithm;
use serde::{Deserialize, Serialize};

// ── Stored graphs ──────────────────────────────────────────────────

/// One analyzed commit of one project. Created by a successful build and
/// never mutated afterwards; removed by retention or explicit delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallGraph {
    pub project_id: String,
    /// Full commit id.
    pub commit: String,
    pub branch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub func_count: usize,
    pub edge_count: usize,
    pub generation_time_ms: u64,
    /// Algorithm that actually produced the graph.
    pub algorithm: Algorithm,
    pub fallback: bool,
    pub data_path: PathBuf,
}

/// History bounds for one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub max_count: usize,
    /// Zero disables the age bound.
    pub max_age_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_count: 10,
            max_age_days: 30,
        }
    }
}

/// Whether a usable graph exists for a commit, and how stale it is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStatus {
    pub exists: bool,
    pub up_to_date: bool,
    pub commits_behind: u32,
    pub head_commit: Option<String>,
    /// Commit of the matching stored graph.
    pub current_commit: Option<String>,
    pub data_path: Option<PathBuf>,
    pub created_at: Option<DateTime<Utc>>,
    pub func_count: Option<usize>,
}

/// Identity recorded alongside a project's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIdentity {
    pub id: String,
    pub name: String,
    pub remote_url: Option<String>,
}

// ── Diff ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// A function whose declared span overlaps a diff hunk. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFunction {
    /// `F` or `T.M`; `unknown` for a file deleted outright.
    pub name: String,
    /// `mod/pkg.F` or `mod/pkg.T.M`; empty when unknown.
    pub full_name: String,
    pub package: String,
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
    pub change_type: ChangeType,
    pub lines_added: u32,
    pub lines_removed: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub files_changed: usize,
    pub functions_changed: usize,
    pub functions_added: usize,
    pub functions_modified: usize,
    pub functions_deleted: usize,
}

impl DiffSummary {
    pub fn from_changes(files: &[String], functions: &[ChangedFunction]) -> Self {
        let count = |t: ChangeType| functions.iter().filter(|f| f.change_type == t).count();
        Self {
            files_changed: files.len(),
            functions_changed: functions.len(),
            functions_added: count(ChangeType::Added),
            functions_modified: count(ChangeType::Modified),
            functions_deleted: count(ChangeType::Deleted),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffAnalysisResult {
    pub commit_range: String,
    pub changed_files: Vec<String>,
    pub changed_functions: Vec<ChangedFunction>,
    pub summary: DiffSummary,
}

// ── Impact ─────────────────────────────────────────────────────────

/// A function reached by walking callers (or callees) from a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    pub function: String,
    pub display_name: String,
    pub package: String,
    pub file: String,
    /// Call site line of the edge that first reached this function.
    pub line: u32,
    /// Minimum distance from the target.
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionImpact {
    pub function: String,
    pub display_name: String,
    pub file: String,
    pub callers: Vec<CallerInfo>,
    pub total_callers: usize,
    pub max_depth_reached: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactSummary {
    /// Number of names requested.
    pub functions_analyzed: usize,
    /// Requested names that matched no function, first occurrence only.
    #[serde(default)]
    pub unmatched: Vec<String>,
    pub total_affected: usize,
    pub affected_files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub analysis_commit: String,
    pub impacts: Vec<FunctionImpact>,
    pub summary: ImpactSummary,
}

// ── Entry points ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCandidate {
    pub file: String,
    pub function: String,
    pub package: String,
    pub recommended: bool,
    pub reason: String,
}

// ── Generation tasks ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// One of the `RippleError::code` values.
    pub code: String,
    pub message: String,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: uuid::Uuid,
    pub project_path: PathBuf,
    pub commit: Option<String>,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<TaskError>,
    pub result: Option<GenerateOutcome>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// What a finished generation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateOutcome {
    pub graph: CallGraph,
    pub module_path: String,
    pub requested: Algorithm,
    pub actual: Algorithm,
    pub fallback: bool,
    pub fallback_reason: Option<String>,
}
