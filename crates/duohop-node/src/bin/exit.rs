//! Standalone exit node binary.

use clap::Parser;
use duohop_node::cli::{run_exit, ExitArgs};

#[tokio::main]
async fn main() {
    let args = ExitArgs::parse();
    if let Err(e) = run_exit(args).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
