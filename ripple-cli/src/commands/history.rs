use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Subcommand};
use ripple_core::types::CallGraph;

use super::{Context, print_json, short};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub action: HistoryAction,

    /// Path to the repository (default: current directory)
    #[arg(long, default_value = ".", global = true)]
    pub path: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// List stored call graphs, newest first
    List,
    /// Make a stored graph the one queries use by default
    SetLatest {
        /// Full commit id or prefix
        commit: String,
    },
    /// Delete a stored graph
    Delete {
        /// Full commit id or prefix
        commit: String,
    },
    /// Apply retention now
    Clean {
        /// Keep at most this many graphs (default: from config)
        #[arg(long)]
        max_count: Option<usize>,
        /// Drop graphs older than this many days; 0 disables (default: from config)
        #[arg(long)]
        max_age_days: Option<u32>,
    },
}

pub async fn run(args: HistoryArgs, ctx: &Context) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let path = &args.path;
    match args.action {
        HistoryAction::List => {
            let graphs = service.history(path).await.context("Cannot list call graphs")?;
            let id = service.project_id(path).await?;
            let latest = service.store().get_latest(&id).await.ok().map(|g| g.commit);
            if ctx.json {
                return print_json(&graphs);
            }
            if graphs.is_empty() {
                println!("No stored call graphs");
                return Ok(());
            }
            for graph in &graphs {
                let mark = if latest.as_deref() == Some(graph.commit.as_str()) { "*" } else { "" };
                print_graph(graph, mark);
            }
        }
        HistoryAction::SetLatest { commit } => {
            let graph = service
                .set_latest(path, &commit)
                .await
                .with_context(|| format!("Cannot set latest to {commit}"))?;
            if ctx.json {
                return print_json(&graph);
            }
            println!("Latest call graph is now {}", short(&graph.commit));
        }
        HistoryAction::Delete { commit } => {
            let graph = service
                .delete_graph(path, &commit)
                .await
                .with_context(|| format!("Cannot delete call graph {commit}"))?;
            if ctx.json {
                return print_json(&graph);
            }
            println!("Deleted call graph {}", short(&graph.commit));
        }
        HistoryAction::Clean {
            max_count,
            max_age_days,
        } => {
            let removed = service
                .clean_history(path, max_count, max_age_days)
                .await
                .context("Cannot clean call graphs")?;
            if ctx.json {
                return print_json(&removed);
            }
            println!("Removed {} call graph(s)", removed.len());
            for graph in &removed {
                print_graph(graph, "");
            }
        }
    }
    Ok(())
}

fn print_graph(graph: &CallGraph, mark: &str) {
    println!(
        "  {:<12} {:<1} {}  {:>6} funcs {:>7} edges  {}{}",
        short(&graph.commit),
        mark,
        graph.created_at.format("%Y-%m-%d %H:%M"),
        graph.func_count,
        graph.edge_count,
        graph.algorithm,
        if graph.fallback { " (fallback)" } else { "" }
    );
}
