//! # duohop
//!
//! A two-hop TCP relay: a blind entry node plus an exit node that speaks a
//! minimal SOCKS5 subset to learn the true destination.
//!
//! ## Crates
//!
//! - [`duohop_core`] - Relay engine, transform hook, default constants
//! - [`duohop_node`] - Entry and exit node implementations
//!
//! ## Data flow
//!
//! `Client → entry node → (raw bytes) → exit node → negotiation → destination`

pub use duohop_core as core;
pub use duohop_node as node;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use duohop_core::{relay_pair, ChunkTransform, Direction, Identity, TransferError};
    pub use duohop_node::{EntryConfig, EntryNode, ExitConfig, ExitNode, NodeError};
}
