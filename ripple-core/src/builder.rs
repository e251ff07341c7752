//! Async front for call graph construction.
//!
//! Loading and the algorithms are CPU-bound; they run on the blocking
//! pool so concurrent requests never stall the runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ripple_graphs::{Algorithm, BuildOptions, BuildOutput, EntryPoint, build_call_graph};
use tracing::debug;

use crate::config::AnalysisSection;
use crate::error::{Result, RippleError};
use crate::progress::{ProgressReporter, ScaledReporter};

/// Per-request overrides on top of the configured analysis defaults.
#[derive(Debug, Clone, Default)]
pub struct BuildOverrides {
    pub algorithm: Option<Algorithm>,
    pub entry_points: Vec<EntryPoint>,
    pub exclude: Option<Vec<String>>,
    pub allow_fallback: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct CallGraphBuilder {
    defaults: AnalysisSection,
}

impl CallGraphBuilder {
    pub fn new(defaults: AnalysisSection) -> Self {
        Self { defaults }
    }

    pub fn options(&self, overrides: BuildOverrides) -> BuildOptions {
        BuildOptions {
            algorithm: overrides.algorithm.unwrap_or(self.defaults.algorithm),
            entry_points: overrides.entry_points,
            exclude: overrides
                .exclude
                .unwrap_or_else(|| self.defaults.exclude.clone()),
            allow_fallback: overrides.allow_fallback.unwrap_or(self.defaults.allow_fallback),
            max_steps: self.defaults.max_steps,
        }
    }

    /// Build the graph of the module under `root`. Builder progress
    /// (0..=100) is rescaled into `start..=end` of `progress`.
    pub async fn build(
        &self,
        root: &Path,
        options: BuildOptions,
        progress: Arc<dyn ProgressReporter>,
        (start, end): (u8, u8),
    ) -> Result<BuildOutput> {
        if !root.is_dir() {
            return Err(RippleError::InputInvalid(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        let root: PathBuf = root.to_path_buf();
        debug!(root = %root.display(), algorithm = %options.algorithm, "Starting call graph build");
        tokio::task::spawn_blocking(move || {
            let scaled = ScaledReporter::new(progress.as_ref(), start, end);
            build_call_graph(&root, &options, &|percent, message| scaled.report(percent, message))
        })
        .await
        .map_err(|e| RippleError::Internal(format!("build task failed: {e}")))?
        .map_err(RippleError::from)
    }
}
