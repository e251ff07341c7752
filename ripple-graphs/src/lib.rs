//! Go call graph engine.
//!
//! Loads a Go module with tree-sitter, builds a call graph with one of the
//! [`Algorithm`] variants, and projects it into flat [`FuncNode`] /
//! [`FuncEdge`] lists ready for persistence. [`spans::function_spans`] maps
//! a single syntax tree to declared function line ranges for diff overlap.

pub mod algorithm;
pub mod builder;
pub mod construct;
pub mod extract;
pub mod loader;
pub mod names;
pub mod program;
pub mod spans;
pub mod syntax;

use serde::{Deserialize, Serialize};

pub use algorithm::{Algorithm, AlgorithmFailure, attempt_with_recovery};
pub use builder::{BuildOptions, BuildOutput, EntryPoint, build_call_graph};
pub use program::Program;

/// Error type for the graph engine.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("No go.mod found under {0}")]
    MissingModule(String),

    #[error("Invalid source root: {0}")]
    InvalidRoot(String),

    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),

    #[error(transparent)]
    AlgorithmFailed(#[from] AlgorithmFailure),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;

// ── Call graph output ──────────────────────────────────────────────

/// A function or method in one call graph snapshot.
///
/// `id` is assigned sequentially per build and is only meaningful inside
/// the snapshot that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncNode {
    pub id: i64,
    /// SSA-style name: `mod/pkg.F`, `(*mod/pkg.T).M` or `(mod/pkg.T).M`.
    pub full_name: String,
    /// Receiver-normalized name: `mod/pkg.T.M`.
    pub canonical_name: String,
    pub package: String,
    /// `F` for functions, `T.M` for methods.
    pub func_name: String,
    pub file_path: String,
    pub line_start: u32,
    pub line_end: u32,
    pub is_exported: bool,
}

/// A single call site. Two calls from the same caller to the same callee
/// are two edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncEdge {
    pub caller_id: i64,
    pub callee_id: i64,
    pub call_site_file: String,
    pub call_site_line: u32,
}
