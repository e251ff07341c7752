use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use ripple_core::error::RippleError;
use ripple_core::store::CallGraphQueries;
use ripple_graphs::names::display_name;
use serde::Serialize;

use super::{Context, print_json};

#[derive(Args, Debug)]
pub struct CalleesArgs {
    /// Full or canonical function name
    pub function: String,

    /// Maximum callee depth
    #[arg(long, default_value_t = 1)]
    pub depth: u32,

    /// Stored graph to query (default: latest)
    #[arg(long)]
    pub commit: Option<String>,

    /// Path to the repository (default: current directory)
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

#[derive(Serialize)]
struct CalleeRow {
    function: String,
    display_name: String,
    depth: u32,
    call_site_file: String,
    call_site_line: u32,
}

pub async fn run(args: CalleesArgs, ctx: &Context) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let (_, db) = service
        .open_snapshot(&args.path, args.commit.as_deref())
        .await
        .context("Cannot open call graph")?;
    let targets = db.nodes_by_names(std::slice::from_ref(&args.function)).await?;
    let Some(target) = targets.first() else {
        return Err(RippleError::NotFound(format!("no function named {} in the call graph", args.function)).into());
    };

    let rows: Vec<CalleeRow> = db
        .callees_with_depth(target.id, args.depth.max(1))
        .await?
        .into_iter()
        .map(|r| CalleeRow {
            display_name: display_name(&r.node.package, &r.node.func_name),
            function: r.node.full_name,
            depth: r.depth,
            call_site_file: r.call_site_file,
            call_site_line: r.call_site_line,
        })
        .collect();

    if ctx.json {
        return print_json(&rows);
    }
    println!(
        "{} calls {} function(s)",
        display_name(&target.package, &target.func_name),
        rows.len()
    );
    for row in &rows {
        let indent = "  ".repeat(row.depth as usize);
        println!(
            "{indent}-> {} [{}:{}]",
            row.display_name, row.call_site_file, row.call_site_line
        );
    }
    Ok(())
}
