//! Algorithm selection and the recovery boundary around construction.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Call graph construction algorithm, from cheapest to most precise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Direct call sites only.
    Static,
    /// Class hierarchy analysis: interface calls fan out to every implementer.
    Cha,
    /// Rapid type analysis: CHA restricted to types instantiated in code
    /// reachable from the entry points.
    #[default]
    Rta,
    /// Variable type analysis: CHA refined by type-flow propagation.
    Vta,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [Self::Static, Self::Cha, Self::Rta, Self::Vta];

    /// Lowercase identifier used in storage and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Cha => "cha",
            Self::Rta => "rta",
            Self::Vta => "vta",
        }
    }

    /// What to try next when this algorithm cannot produce a graph.
    pub fn suggestion(self) -> &'static str {
        match self {
            Self::Rta => "check entry-point config or retry with CHA / Static",
            Self::Vta => "retry with CHA or Static",
            Self::Cha => "retry with Static",
            Self::Static => "check that the module parses cleanly",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Static => "Static",
            Self::Cha => "CHA",
            Self::Rta => "RTA",
            Self::Vta => "VTA",
        };
        f.write_str(label)
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "cha" => Ok(Self::Cha),
            "rta" => Ok(Self::Rta),
            "vta" => Ok(Self::Vta),
            other => Err(format!(
                "unknown algorithm '{other}' (expected static, cha, rta or vta)"
            )),
        }
    }
}

// ── Failure ────────────────────────────────────────────────────────

/// Structured failure of one construction attempt.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{algorithm} call graph construction failed: {reason}")]
pub struct AlgorithmFailure {
    pub algorithm: Algorithm,
    pub reason: String,
    pub suggestion: String,
    pub details: String,
}

impl AlgorithmFailure {
    pub fn new(algorithm: Algorithm, reason: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            algorithm,
            reason: reason.into(),
            suggestion: algorithm.suggestion().to_string(),
            details: details.into(),
        }
    }

    pub fn no_entry_point(algorithm: Algorithm) -> Self {
        Self::new(
            algorithm,
            "no entry point found",
            format!("{algorithm} requires a main() or init() entry, or a configured file:function"),
        )
    }
}

/// Run one construction attempt, turning a panic into an [`AlgorithmFailure`].
///
/// The closure must not leave shared state half-updated; everything it
/// touches is owned by the attempt.
pub fn attempt_with_recovery<T, F>(algorithm: Algorithm, f: F) -> Result<T, AlgorithmFailure>
where
    F: FnOnce() -> Result<T, AlgorithmFailure>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let details = panic_message(payload.as_ref());
            warn!(algorithm = %algorithm, details = %details, "Call graph construction panicked");
            Err(AlgorithmFailure::new(
                algorithm,
                "construction aborted unexpectedly",
                details,
            ))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ── Work budget ────────────────────────────────────────────────────

/// Bounds the fixpoint loops so pathological input fails instead of spinning.
#[derive(Debug)]
pub struct Budget {
    algorithm: Algorithm,
    remaining: usize,
}

impl Budget {
    pub fn new(algorithm: Algorithm, steps: usize) -> Self {
        Self {
            algorithm,
            remaining: steps,
        }
    }

    pub fn tick(&mut self) -> Result<(), AlgorithmFailure> {
        if self.remaining == 0 {
            return Err(AlgorithmFailure::new(
                self.algorithm,
                "analysis did not converge within the step budget",
                "raise analysis.max_steps or choose a cheaper algorithm",
            ));
        }
        self.remaining -= 1;
        Ok(())
    }
}
