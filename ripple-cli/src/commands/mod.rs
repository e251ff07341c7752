pub mod callees;
pub mod diff;
pub mod generate;
pub mod history;
pub mod impact;
pub mod scan;
pub mod search;
pub mod status;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Subcommand;
use ripple_core::config::RippleConfig;
use ripple_core::service::AnalysisService;
use serde::Serialize;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List candidate entry points (main and init functions)
    Scan(scan::ScanArgs),
    /// Show whether a call graph exists for HEAD or a commit
    Status(status::StatusArgs),
    /// Build and store the call graph of a commit
    Generate(generate::GenerateArgs),
    /// Map a diff onto the functions it changes
    Diff(diff::DiffArgs),
    /// Transitive callers of functions, or of everything a diff changes
    Impact(impact::ImpactArgs),
    /// List and manage stored call graphs
    History(history::HistoryArgs),
    /// Find functions in a stored call graph
    Search(search::SearchArgs),
    /// Transitive callees of a function
    Callees(callees::CalleesArgs),
}

/// Flags shared by every command.
#[derive(Debug)]
pub struct Context {
    pub config: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

impl Context {
    pub fn load_config(&self) -> anyhow::Result<RippleConfig> {
        RippleConfig::load_or_default(self.config.as_deref()).context("Cannot load config")
    }

    pub fn service(&self) -> anyhow::Result<AnalysisService> {
        let config = self.load_config()?;
        AnalysisService::from_config(config).context("Cannot open project registry")
    }
}

pub async fn run(cmd: Command, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        Command::Scan(args) => scan::run(args, ctx).await,
        Command::Status(args) => status::run(args, ctx).await,
        Command::Generate(args) => generate::run(args, ctx).await,
        Command::Diff(args) => diff::run(args, ctx).await,
        Command::Impact(args) => impact::run(args, ctx).await,
        Command::History(args) => history::run(args, ctx).await,
        Command::Search(args) => search::run(args, ctx).await,
        Command::Callees(args) => callees::run(args, ctx).await,
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn short(commit: &str) -> &str {
    &commit[..commit.len().min(12)]
}
