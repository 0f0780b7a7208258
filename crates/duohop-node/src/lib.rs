//! Entry and exit nodes for the duohop two-hop TCP relay.
//!
//! `Client → entry node → exit node → destination`
//!
//! - **Entry node**: accepts client connections, opens one tunnel
//!   connection to the exit node per client, and relays bytes blindly in
//!   both directions.
//! - **Exit node**: accepts tunnel connections from the entry node, runs a
//!   minimal SOCKS5 negotiation to learn the true destination, dials it,
//!   and relays between tunnel and destination.
//!
//! The client speaks SOCKS5 end-to-end with the exit node; the entry node
//! never inspects the stream. Payloads may be reshaped on either hop via
//! the [`duohop_core::ChunkTransform`] hook.

pub mod cli;
pub mod config;
pub mod entry;
pub mod error;
pub mod exit;
pub mod resolve;
pub mod socks;
pub mod util;

pub use config::{EntryConfig, ExitConfig, TimeoutConfig};
pub use entry::EntryNode;
pub use error::{NodeError, SocksError};
pub use exit::ExitNode;
