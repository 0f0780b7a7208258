//! I/O primitives for bidirectional relaying.

mod relay;

pub use relay::{forward, relay_pair, ChunkTransform, Direction, Identity, TransferError};
