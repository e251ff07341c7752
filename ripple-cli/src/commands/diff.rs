use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;
use ripple_core::types::ChangeType;

use super::{Context, print_json};

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Commit range (`a..b`, `a...b` or a single ref); omit for uncommitted changes
    #[arg(default_value = "")]
    pub range: String,

    /// Path to the repository (default: current directory)
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

pub async fn run(args: DiffArgs, ctx: &Context) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let result = service
        .analyze_diff(&args.path, &args.range)
        .await
        .context("Cannot analyze diff")?;

    if ctx.json {
        return print_json(&result);
    }

    let s = &result.summary;
    println!("Diff {}: {} file(s), {} function(s)", result.commit_range, s.files_changed, s.functions_changed);
    println!(
        "  added {}, modified {}, deleted {}",
        s.functions_added, s.functions_modified, s.functions_deleted
    );
    if result.changed_functions.is_empty() {
        return Ok(());
    }
    println!();
    for f in &result.changed_functions {
        let tag = match f.change_type {
            ChangeType::Added => "+",
            ChangeType::Modified => "~",
            ChangeType::Deleted => "-",
        };
        println!(
            "  {tag} {:<40} {}:{}-{}  (+{} -{})",
            f.name, f.file, f.line_start, f.line_end, f.lines_added, f.lines_removed
        );
    }
    Ok(())
}
