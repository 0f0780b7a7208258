//! Core relay engine and constants shared by the duohop node crates.
//!
//! This crate provides:
//! - The bidirectional byte relay used by both the entry and exit nodes
//! - The per-chunk transform hook for payload processing
//! - Default configuration values

pub mod defaults;
pub mod io;

pub use io::{forward, relay_pair, ChunkTransform, Direction, Identity, TransferError};

/// Project name.
pub const PROJECT_NAME: &str = "duohop";
/// Project version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
