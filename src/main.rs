//! Unified duohop CLI.
//!
//! This binary fronts both relay roles:
//! - `duohop entry` - Run the entry node
//! - `duohop exit` - Run the exit node
//!
//! Each subcommand can also be run as a standalone binary
//! (`duohop-entry`, `duohop-exit`).

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use duohop_node::cli::{run_entry, run_exit, EntryArgs, ExitArgs};

/// Duohop unified CLI.
#[derive(Parser)]
#[command(
    name = "duohop",
    version,
    about = "Two-hop TCP relay: blind entry node plus SOCKS5-negotiating exit node",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the entry node.
    Entry(EntryArgs),

    /// Run the exit node.
    Exit(ExitArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Entry(args) => run_entry(args).await,
        Commands::Exit(args) => run_exit(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
