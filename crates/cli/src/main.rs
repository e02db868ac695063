/// Entry point for the Tangle CLI, a JavaScript control-flow obfuscator.
///
/// This module parses command-line arguments and dispatches to subcommands for obfuscating
/// JavaScript or dumping the block graphs flattening produces. It initializes logging and
/// handles the main execution flow.
mod commands;

use clap::Parser;
use commands::{Cmd, Command};
use tracing_subscriber::EnvFilter;

/// Command-line interface for Tangle.
///
/// Tangle rewrites JavaScript functions into state-machine dispatch loops (control-flow
/// flattening) with optional dead code and disguised case tests.
#[derive(Parser)]
#[command(name = "tangle")]
#[command(about = "Tangle: JavaScript control-flow obfuscator")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

/// Runs the Tangle CLI with the provided arguments.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout carries only the generated code.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    cli.command.execute().await
}
