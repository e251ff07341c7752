use std::path::{Path, PathBuf};
use std::time::Duration;

use ripple_graphs::Algorithm;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level Ripple configuration, matching `~/.config/ripple/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RippleConfig {
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub analysis: AnalysisSection,
    #[serde(default)]
    pub worktree: WorktreeSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
}

impl RippleConfig {
    /// `~/.config/ripple/config.toml`, or `None` on platforms without a
    /// config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ripple").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, else from the default location; a missing
    /// default file yields the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::load(&p),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worktree.materialize_deps && self.worktree.deps_command.is_empty() {
            return Err(ConfigError::Invalid(
                "worktree.deps_command must not be empty when materialize_deps is on".into(),
            ));
        }
        if self.analysis.max_steps == 0 {
            return Err(ConfigError::Invalid("analysis.max_steps must be positive".into()));
        }
        Ok(())
    }

    /// Project registry document, stored next to the graph data.
    pub fn registry_path(&self) -> PathBuf {
        self.storage.data_dir.join("projects.toml")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    pub data_dir: PathBuf,
    pub max_count: usize,
    pub max_age_days: u32,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("ripple"),
            max_count: 10,
            max_age_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSection {
    pub algorithm: Algorithm,
    pub allow_fallback: bool,
    pub exclude: Vec<String>,
    /// Work budget for a single construction attempt.
    pub max_steps: usize,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Rta,
            allow_fallback: false,
            exclude: vec!["vendor/".into(), "*_test.go".into()],
            max_steps: 2_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeSection {
    pub materialize_deps: bool,
    pub deps_command: Vec<String>,
    /// Worktree directories are named `<prefix>-worktree-<commit>-<suffix>`.
    pub temp_prefix: String,
}

impl Default for WorktreeSection {
    fn default() -> Self {
        Self {
            materialize_deps: true,
            deps_command: vec!["go".into(), "mod".into(), "download".into()],
            temp_prefix: "ripple".into(),
        }
    }
}

/// Subprocess time bounds, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsSection {
    pub rev_parse: u64,
    pub rev_list: u64,
    pub diff: u64,
    pub worktree_add: u64,
    pub worktree_remove: u64,
    pub deps: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            rev_parse: 5,
            rev_list: 5,
            diff: 30,
            worktree_add: 30,
            worktree_remove: 15,
            deps: 120,
        }
    }
}

impl TimeoutsSection {
    pub fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }
}
