//! CLI for the entry and exit node binaries.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use duohop_core::Identity;

use crate::config::{EntryConfig, ExitConfig};
use crate::error::NodeError;

/// CLI arguments for the entry node.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "duohop-entry",
    version,
    about = "Relay entry node — forwards client connections to the exit node"
)]
pub struct EntryArgs {
    /// Config file path (toml).
    #[arg(short, long, default_value = "entry.toml")]
    pub config: PathBuf,

    /// Log level override (e.g. "info", "debug", "trace").
    #[arg(long)]
    pub log_level: Option<String>,
}

/// CLI arguments for the exit node.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "duohop-exit",
    version,
    about = "Relay exit node — negotiates destinations and dials them"
)]
pub struct ExitArgs {
    /// Config file path (toml).
    #[arg(short, long, default_value = "exit.toml")]
    pub config: PathBuf,

    /// Log level override (e.g. "info", "debug", "trace").
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Run the entry node with the given CLI arguments.
pub async fn run_entry(args: EntryArgs) -> Result<(), NodeError> {
    let config: EntryConfig = load_config(&args.config)?;
    init_tracing(args.log_level.as_deref());

    crate::entry::run(config, Arc::new(Identity), shutdown_token()).await
}

/// Run the exit node with the given CLI arguments.
pub async fn run_exit(args: ExitArgs) -> Result<(), NodeError> {
    let config: ExitConfig = load_config(&args.config)?;
    init_tracing(args.log_level.as_deref());

    crate::exit::run(config, Arc::new(Identity), shutdown_token()).await
}

fn load_config<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T, NodeError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| NodeError::Config(format!("failed to read config file {path:?}: {e}")))?;
    toml::from_str(&raw).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
}

/// Token cancelled on Ctrl+C or SIGTERM.
fn shutdown_token() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal_handler().await;
        info!("shutdown signal received");
        signal.cancel();
    });
    shutdown
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_tracing(level: Option<&str>) {
    let level = level.unwrap_or("info");
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}
