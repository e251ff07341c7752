use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Args;
use ripple_core::progress::{IndicatifReporter, ProgressReporter};
use ripple_core::service::GenerateRequest;
use ripple_graphs::{Algorithm, EntryPoint};

use super::{Context, print_json, short};

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Path to the Go module (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Commit, branch or tag to analyze (default: HEAD, built in place)
    #[arg(long)]
    pub commit: Option<String>,

    /// Construction algorithm: static, cha, rta, vta
    #[arg(long)]
    pub algorithm: Option<Algorithm>,

    /// Entry point as `file:function` or `function` (repeatable)
    #[arg(long = "entry")]
    pub entries: Vec<EntryPoint>,

    /// Fall back to a cheaper algorithm if construction fails
    #[arg(long)]
    pub fallback: bool,
}

pub async fn run(args: GenerateArgs, ctx: &Context) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let bar = Arc::new(if ctx.json || ctx.quiet {
        IndicatifReporter::hidden()
    } else {
        IndicatifReporter::new()
    });
    let request = GenerateRequest {
        path: args.path.clone(),
        commit: args.commit,
        algorithm: args.algorithm,
        entry_points: args.entries,
        allow_fallback: args.fallback.then_some(true),
    };
    let reporter: Arc<dyn ProgressReporter> = bar.clone();
    let result = service.generate_now(request, reporter).await;
    bar.finish();
    let outcome =
        result.with_context(|| format!("Cannot generate call graph for {}", args.path.display()))?;

    if ctx.json {
        return print_json(&outcome);
    }
    let graph = &outcome.graph;
    println!("Call graph generated for {}", outcome.module_path);
    println!();
    println!("  Commit:    {}", short(&graph.commit));
    if let Some(branch) = &graph.branch {
        println!("  Branch:    {branch}");
    }
    println!("  Algorithm: {}", outcome.actual);
    if let Some(reason) = &outcome.fallback_reason {
        println!("  Fallback:  {} failed: {reason}", outcome.requested);
    }
    println!("  Functions: {}", graph.func_count);
    println!("  Edges:     {}", graph.edge_count);
    println!("  Time:      {} ms", graph.generation_time_ms);
    println!("  Stored at: {}", graph.data_path.display());
    Ok(())
}
