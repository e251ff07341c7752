use std::path::PathBuf;

use clap::Parser;
use ripple_core::error::{ConfigError, RippleError};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "ripple",
    version,
    about = "Call graphs, diff and change impact for Go repositories"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Config file (default: ~/.config/ripple/config.toml)
    #[arg(long, global = true, env = "RIPPLE_CONFIG")]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Exit codes:
///   0 success
///   1 internal or unknown error
///   2 invalid input or configuration
///   3 project, commit or graph not found
///   4 call graph construction failed
///   5 git or the dependency command failed
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    if err.chain().any(|e| e.downcast_ref::<ConfigError>().is_some()) {
        return 2;
    }
    let Some(ripple) = err.chain().find_map(|e| e.downcast_ref::<RippleError>()) else {
        return 1;
    };
    match ripple.code() {
        "INPUT_INVALID" => 2,
        "NOT_FOUND" => 3,
        "ALGORITHM_FAILED" => 4,
        "EXTERNAL_TOOL_FAILED" => 5,
        _ if matches!(ripple, RippleError::Config(_)) => 2,
        _ => 1,
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    let ctx = commands::Context {
        config: cli.config,
        json: cli.json,
        quiet: cli.quiet,
    };
    match runtime.block_on(commands::run(cli.command, &ctx)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(hint) = e
                .chain()
                .find_map(|e| e.downcast_ref::<RippleError>())
                .and_then(RippleError::suggestion)
            {
                eprintln!("Hint: {hint}");
            }
            std::process::exit(classify_exit_code(&e));
        }
    }
}
