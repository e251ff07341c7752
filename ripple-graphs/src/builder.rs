//! End-to-end call graph build: load, construct, fall back, project.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::algorithm::{Algorithm, AlgorithmFailure, attempt_with_recovery};
use crate::construct::{Resolution, construct};
use crate::loader::load_program;
use crate::names;
use crate::program::{FuncId, Program};
use crate::{FuncEdge, FuncNode, Result};

const DEFAULT_MAX_STEPS: usize = 2_000_000;

/// A configured analysis root: `file.go:Func`, or just `Func`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub function: String,
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}", self.function),
            None => f.write_str(&self.function),
        }
    }
}

impl FromStr for EntryPoint {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (file, function) = match s.rsplit_once(':') {
            Some((file, func)) => (Some(file.trim().to_string()), func.trim()),
            None => (None, s),
        };
        if function.is_empty() || file.as_deref().is_some_and(str::is_empty) {
            return Err(format!("invalid entry point '{s}', expected file.go:Func or Func"));
        }
        Ok(Self {
            file,
            function: function.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub algorithm: Algorithm,
    pub entry_points: Vec<EntryPoint>,
    pub exclude: Vec<String>,
    /// Retry a failed build with a cheaper algorithm.
    pub allow_fallback: bool,
    pub max_steps: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            entry_points: Vec::new(),
            exclude: Vec::new(),
            allow_fallback: false,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutput {
    pub module_path: String,
    pub requested: Algorithm,
    pub actual: Algorithm,
    pub fallback: bool,
    pub fallback_reason: Option<String>,
    pub nodes: Vec<FuncNode>,
    pub edges: Vec<FuncEdge>,
}

/// The next algorithm to try after `failed`, if any.
fn fallback_for(failed: Algorithm) -> Option<Algorithm> {
    match failed {
        Algorithm::Rta | Algorithm::Vta => Some(Algorithm::Cha),
        Algorithm::Cha => Some(Algorithm::Static),
        Algorithm::Static => None,
    }
}

/// Build the call graph of the Go module under `root`.
///
/// `progress` receives `(percent, message)` at each phase boundary. A
/// construction failure is returned as [`crate::GraphError::AlgorithmFailed`]
/// unless `allow_fallback` is set and a cheaper algorithm succeeds.
pub fn build_call_graph(
    root: &Path,
    options: &BuildOptions,
    progress: &dyn Fn(u8, &str),
) -> Result<BuildOutput> {
    progress(0, "Loading packages");
    let program = load_program(root, &options.exclude)?;
    progress(
        40,
        &format!("Loaded {} functions from {}", program.len(), program.module_path),
    );

    let entries = resolve_entries(&program, &options.entry_points);

    progress(45, &format!("Building call graph ({})", options.algorithm));
    let (actual, resolution, fallback_reason) = run_with_fallback(&program, &entries, options)?;

    progress(80, "Extracting nodes and edges");
    let (nodes, edges) = project(&program, &resolution);

    info!(
        module = %program.module_path,
        requested = %options.algorithm,
        actual = %actual,
        nodes = nodes.len(),
        edges = edges.len(),
        "Call graph built"
    );
    progress(100, "Done");

    Ok(BuildOutput {
        module_path: program.module_path.clone(),
        requested: options.algorithm,
        actual,
        fallback: fallback_reason.is_some(),
        fallback_reason,
        nodes,
        edges,
    })
}

/// `main`/`init` plus every configured entry that names a loaded function.
fn resolve_entries(program: &Program, configured: &[EntryPoint]) -> Vec<FuncId> {
    let mut entries = program.default_entries();
    for entry in configured {
        match program.resolve_entry(entry.file.as_deref(), &entry.function) {
            Some(id) if !entries.contains(&id) => entries.push(id),
            Some(_) => {}
            None => warn!(entry = %entry, "Configured entry point not found"),
        }
    }
    entries
}

fn run_with_fallback(
    program: &Program,
    entries: &[FuncId],
    options: &BuildOptions,
) -> std::result::Result<(Algorithm, Resolution, Option<String>), AlgorithmFailure> {
    let mut algorithm = options.algorithm;
    let mut first_failure: Option<AlgorithmFailure> = None;
    loop {
        let attempt = attempt_with_recovery(algorithm, || {
            construct(program, algorithm, entries, options.max_steps)
        });
        let failure = match attempt {
            Ok(resolution) => {
                let reason = first_failure.map(|f| f.to_string());
                return Ok((algorithm, resolution, reason));
            }
            Err(failure) => failure,
        };
        warn!(
            algorithm = %algorithm,
            reason = %failure.reason,
            details = %failure.details,
            "Call graph construction failed"
        );
        let next = fallback_for(algorithm).filter(|_| options.allow_fallback);
        let Some(next) = next else {
            return Err(first_failure.unwrap_or(failure));
        };
        info!(from = %algorithm, to = %next, "Falling back");
        first_failure.get_or_insert(failure);
        algorithm = next;
    }
}

/// Flatten a resolution into sequentially numbered nodes and per-site edges.
fn project(program: &Program, resolution: &Resolution) -> (Vec<FuncNode>, Vec<FuncEdge>) {
    let included: Vec<FuncId> = match &resolution.reachable {
        Some(set) => set.iter().copied().collect(),
        None => (0..program.len()).collect(),
    };

    let mut local = vec![None; program.len()];
    let mut nodes = Vec::with_capacity(included.len());
    for (next_id, func) in (1_i64..).zip(&included) {
        let f = program.function(*func);
        let full_name = f.full_name();
        local[*func] = Some(next_id);
        nodes.push(FuncNode {
            id: next_id,
            canonical_name: names::canonical_name(&full_name),
            full_name,
            package: f.package.clone(),
            func_name: f.func_name(),
            file_path: f.file.clone(),
            line_start: f.line_start,
            line_end: f.line_end,
            is_exported: names::is_exported(&f.name),
        });
    }

    let edges = resolution
        .edges
        .iter()
        .filter_map(|e| {
            let caller_id = local[e.caller]?;
            let callee_id = local[e.callee]?;
            let caller = program.function(e.caller);
            Some(FuncEdge {
                caller_id,
                callee_id,
                call_site_file: caller.file.clone(),
                call_site_line: caller.body.calls[e.site].line,
            })
        })
        .collect();
    (nodes, edges)
}
