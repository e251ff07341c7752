use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use ripple_core::types::ImpactReport;

use super::{Context, print_json, short};

#[derive(Args, Debug)]
#[command(group(
    clap::ArgGroup::new("targets").required(true).args(["functions", "range"])
))]
pub struct ImpactArgs {
    /// Full or canonical function names (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub functions: Vec<String>,

    /// Analyze every function changed in this range (`working` for uncommitted changes)
    #[arg(long)]
    pub range: Option<String>,

    /// Maximum caller depth; zero or less uses the default
    #[arg(long, default_value_t = 3, allow_negative_numbers = true)]
    pub depth: i32,

    /// Stored graph to query (default: latest)
    #[arg(long, conflicts_with = "range")]
    pub commit: Option<String>,

    /// Path to the repository (default: current directory)
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

pub async fn run(args: ImpactArgs, ctx: &Context) -> anyhow::Result<()> {
    let service = ctx.service()?;

    if let Some(range) = &args.range {
        let analysis = service
            .full_analysis(&args.path, range, args.depth)
            .await
            .context("Cannot run impact analysis")?;
        if ctx.json {
            return print_json(&analysis);
        }
        println!(
            "{} changed function(s) in {}",
            analysis.diff.summary.functions_changed, analysis.diff.commit_range
        );
        println!();
        print_report(&analysis.impact);
        return Ok(());
    }

    let report = service
        .query_impact(&args.path, args.commit.as_deref(), &args.functions, args.depth)
        .await
        .context("Cannot run impact analysis")?;
    if ctx.json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &ImpactReport) {
    println!("Impact against graph {}", short(&report.analysis_commit));
    if !report.summary.unmatched.is_empty() {
        println!(
            "  ({} requested function(s) not in the graph: {})",
            report.summary.unmatched.len(),
            report.summary.unmatched.join(", ")
        );
    }
    for impact in &report.impacts {
        println!();
        println!(
            "  {} ({})  {} caller(s), max depth {}",
            impact.display_name, impact.file, impact.total_callers, impact.max_depth_reached
        );
        for caller in &impact.callers {
            let indent = "  ".repeat(caller.depth as usize);
            println!(
                "  {indent}<- {} [{}:{}]",
                caller.display_name, caller.file, caller.line
            );
        }
    }
    println!();
    println!(
        "  {} affected function(s) in {} file(s)",
        report.summary.total_affected,
        report.summary.affected_files.len()
    );
}
