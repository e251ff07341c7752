use ripple_graphs::{AlgorithmFailure, GraphError};

/// Top-level Ripple error type.
///
/// All fallible operations in `ripple-core` return [`Result<T, RippleError>`](Result).
/// The first four variants are the caller-facing taxonomy; the rest wrap a
/// domain-specific error enum without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum RippleError {
    /// Bad path, malformed range, missing module.
    #[error("Invalid input: {0}")]
    InputInvalid(String),

    /// Project, commit or graph absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Construction crashed or found no entry point.
    #[error(transparent)]
    AlgorithmFailed(#[from] AlgorithmFailure),

    /// A `git` or dependency subprocess failed or timed out.
    #[error("External tool failed: {0}")]
    Vcs(#[from] VcsError),

    /// Error from the per-project metadata or a per-commit database.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Graph engine failure other than a construction failure.
    #[error("Graph engine error: {0}")]
    Graph(GraphError),

    /// A background task died or a blocking job was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<GraphError> for RippleError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::AlgorithmFailed(failure) => Self::AlgorithmFailed(failure),
            GraphError::MissingModule(_) | GraphError::InvalidRoot(_) => {
                Self::InputInvalid(err.to_string())
            }
            other => Self::Graph(other),
        }
    }
}

impl RippleError {
    /// Lets a caller offer "generate now" instead of a hard failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Stable machine-readable code, recorded on failed tasks.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InputInvalid(_) => "INPUT_INVALID",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlgorithmFailed(_) => "ALGORITHM_FAILED",
            Self::Vcs(_) => "EXTERNAL_TOOL_FAILED",
            Self::Store(_) | Self::Config(_) | Self::Graph(_) | Self::Internal(_) => "INTERNAL",
        }
    }

    /// What the caller could try next, when there is something to try.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::AlgorithmFailed(f) => Some(f.suggestion.clone()),
            Self::Vcs(VcsError::Timeout { .. }) => {
                Some("raise the matching [timeouts] value or retry".to_string())
            }
            Self::Vcs(_) => Some("check that the reference exists and git is installed".to_string()),
            Self::NotFound(_) => Some("generate a call graph first".to_string()),
            _ => None,
        }
    }

    /// Raw detail for structured reporting.
    pub fn details(&self) -> Option<String> {
        match self {
            Self::AlgorithmFailed(f) => Some(f.details.clone()),
            Self::Vcs(VcsError::Failed { stderr, .. }) => Some(stderr.clone()),
            _ => None,
        }
    }
}

/// Errors from `git` and the dependency command.
#[derive(thiserror::Error, Debug)]
pub enum VcsError {
    /// The process ran and exited nonzero.
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    /// The process was killed after exceeding its time bound.
    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// The process could not be started at all.
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Read-only repository inspection through gix failed.
    #[error("Repository error: {0}")]
    Repository(String),
}

/// Errors from the durable call graph layout.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization of the metadata document failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in Ripple configuration and registry files.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML syntax or schema error.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for `Result<T, RippleError>`.
pub type Result<T> = std::result::Result<T, RippleError>;

#[cfg(test)]
mod tests {
    use ripple_graphs::Algorithm;

    use super::*;

    #[test]
    fn graph_errors_map_to_taxonomy() {
        let err: RippleError = GraphError::MissingModule("/tmp/x".into()).into();
        assert_eq!(err.code(), "INPUT_INVALID");

        let failure = AlgorithmFailure::no_entry_point(Algorithm::Rta);
        let err: RippleError = GraphError::AlgorithmFailed(failure).into();
        assert_eq!(err.code(), "ALGORITHM_FAILED");
        assert_eq!(err.suggestion().as_deref(), Some(Algorithm::Rta.suggestion()));
        assert!(err.to_string().contains("no entry point"));
    }

    #[test]
    fn not_found_is_distinguishable() {
        assert!(RippleError::NotFound("graph".into()).is_not_found());
        assert!(!RippleError::InputInvalid("graph".into()).is_not_found());
    }

    #[test]
    fn vcs_errors_are_external_tool_failures() {
        let err: RippleError = VcsError::Timeout {
            command: "git diff".into(),
            secs: 30,
        }
        .into();
        assert_eq!(err.code(), "EXTERNAL_TOOL_FAILED");
        assert!(err.to_string().contains("timed out after 30s"));
    }
}
