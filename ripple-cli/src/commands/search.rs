use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use ripple_core::store::{CallGraphQueries, DEFAULT_SEARCH_LIMIT};
use ripple_graphs::names::display_name;

use super::{Context, print_json};

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// `file:line`, a `.go` path, a full name, `pkg.Func` or a name fragment
    pub query: String,

    /// Maximum number of matches
    #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    pub limit: usize,

    /// Stored graph to search (default: latest)
    #[arg(long)]
    pub commit: Option<String>,

    /// Path to the repository (default: current directory)
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

pub async fn run(args: SearchArgs, ctx: &Context) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let (_, db) = service
        .open_snapshot(&args.path, args.commit.as_deref())
        .await
        .context("Cannot open call graph")?;
    let matches = db.search_functions(&args.query, args.limit).await?;

    if ctx.json {
        return print_json(&matches);
    }
    if matches.is_empty() {
        println!("No functions match: {}", args.query);
        return Ok(());
    }
    for node in &matches {
        println!(
            "  {:<40} {}:{}-{}",
            display_name(&node.package, &node.func_name),
            node.file_path,
            node.line_start,
            node.line_end
        );
        println!("    {}", node.full_name);
    }
    Ok(())
}
