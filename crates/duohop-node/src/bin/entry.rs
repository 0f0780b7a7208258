//! Standalone entry node binary.

use clap::Parser;
use duohop_node::cli::{run_entry, EntryArgs};

#[tokio::main]
async fn main() {
    let args = EntryArgs::parse();
    if let Err(e) = run_entry(args).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
