use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;

use super::{Context, print_json, short};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Path to the repository (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Commit to check instead of HEAD
    #[arg(long)]
    pub commit: Option<String>,
}

pub async fn run(args: StatusArgs, ctx: &Context) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let status = service
        .check_status(&args.path, args.commit.as_deref())
        .await
        .with_context(|| format!("Cannot read status of {}", args.path.display()))?;

    if ctx.json {
        return print_json(&status);
    }

    println!("Call graph status for {}", args.path.display());
    println!();
    if let Some(head) = &status.head_commit {
        println!("  HEAD:      {}", short(head));
    }
    if !status.exists {
        println!("  Graph:     none (run `ripple generate`)");
        return Ok(());
    }
    if let Some(commit) = &status.current_commit {
        println!("  Graph:     {}", short(commit));
    }
    if let Some(created) = status.created_at {
        println!("  Created:   {}", created.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(funcs) = status.func_count {
        println!("  Functions: {funcs}");
    }
    if status.up_to_date {
        println!("  State:     up to date");
    } else {
        println!(
            "  State:     {} commit{} behind HEAD",
            status.commits_behind,
            if status.commits_behind == 1 { "" } else { "s" }
        );
    }
    Ok(())
}
