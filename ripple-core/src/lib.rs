//! Ripple core library: graph store, worktrees, diff resolution and impact.
//!
//! The main entry point is [`service::AnalysisService`], which ties the
//! call graph builder from `ripple-graphs` to the per-commit
//! [`store::CallGraphStore`], the [`diff::DiffResolver`] and the
//! [`impact::ImpactEngine`].

pub mod builder;
pub mod config;
pub mod diff;
pub mod error;
pub mod impact;
pub mod progress;
pub mod registry;
pub mod scan;
pub mod service;
pub mod store;
pub mod types;
pub mod vcs;
pub mod worktree;
