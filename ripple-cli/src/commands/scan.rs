use std::path::PathBuf;

use anyhow::Context as _;
use clap::Args;

use super::{Context, print_json};

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Path to the Go module (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

pub async fn run(args: ScanArgs, ctx: &Context) -> anyhow::Result<()> {
    let service = ctx.service()?;
    let candidates = service
        .scan(&args.path)
        .await
        .with_context(|| format!("Cannot scan {}", args.path.display()))?;

    if ctx.json {
        return print_json(&candidates);
    }
    if candidates.is_empty() {
        println!("No main or init functions found; use --algorithm cha or --entry file:function");
        return Ok(());
    }
    println!("Entry point candidates:");
    for c in &candidates {
        let mark = if c.recommended { "*" } else { " " };
        println!("  {mark} {}:{:<20} {} ({})", c.file, c.function, c.package, c.reason);
    }
    println!();
    println!("  * recommended");
    Ok(())
}
