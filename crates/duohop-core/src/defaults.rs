//! Default configuration values.
//!
//! Centralized default constants used by both node roles.

/// Default relay buffer size per forwarding direction (32 KiB).
pub const DEFAULT_RELAY_BUFFER_SIZE: usize = 32768;

/// Default timeout for establishing outbound connections (seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default idle timeout: the relay ends when neither direction has moved
/// data within this window (seconds).
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Default timeout for the exit-side destination negotiation (seconds).
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 5;

/// Default graceful shutdown drain timeout (seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default TCP listener backlog.
pub const DEFAULT_CONNECTION_BACKLOG: u32 = 1024;
