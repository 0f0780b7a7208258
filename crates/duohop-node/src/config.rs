//! Configuration for entry and exit nodes.
//!
//! Both roles load a small TOML file. Every field in [`TimeoutConfig`] has
//! a default, so a minimal config only needs the addresses.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use duohop_core::defaults;

/// Entry node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Address to accept client connections on (ip:port).
    pub listen: SocketAddr,

    /// Exit node address (host:port). One tunnel connection is opened here
    /// per accepted client.
    pub exit: String,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Exit node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    /// Address to accept tunnel connections on (ip:port).
    pub listen: SocketAddr,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Timeout and buffer settings shared by both roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Timeout for outbound connections (tunnel or destination), seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle relay timeout, seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Destination negotiation timeout, seconds. Only used by exit nodes.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Graceful shutdown drain timeout, seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Relay buffer size per direction (bytes).
    #[serde(default = "default_relay_buffer_size")]
    pub relay_buffer_size: usize,

    /// TCP listener backlog.
    #[serde(default = "default_connection_backlog")]
    pub connection_backlog: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            handshake_timeout_secs: default_handshake_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            relay_buffer_size: default_relay_buffer_size(),
            connection_backlog: default_connection_backlog(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    defaults::DEFAULT_CONNECT_TIMEOUT_SECS
}
fn default_idle_timeout() -> u64 {
    defaults::DEFAULT_IDLE_TIMEOUT_SECS
}
fn default_handshake_timeout() -> u64 {
    defaults::DEFAULT_HANDSHAKE_TIMEOUT_SECS
}
fn default_shutdown_timeout() -> u64 {
    defaults::DEFAULT_SHUTDOWN_TIMEOUT_SECS
}
fn default_relay_buffer_size() -> usize {
    defaults::DEFAULT_RELAY_BUFFER_SIZE
}
fn default_connection_backlog() -> u32 {
    defaults::DEFAULT_CONNECTION_BACKLOG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_entry_config() {
        let toml_str = r#"
listen = "127.0.0.1:5678"
exit = "exit.example.net:6789"

[timeouts]
connect_timeout_secs = 15
"#;
        let config: EntryConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.listen.port(), 5678);
        assert_eq!(config.exit, "exit.example.net:6789");
        assert_eq!(config.timeouts.connect_timeout_secs, 15);
        assert_eq!(config.timeouts.idle_timeout_secs, 300); // default
        assert_eq!(config.timeouts.relay_buffer_size, 32768); // default
    }

    #[test]
    fn parse_exit_config_minimal() {
        let toml_str = r#"listen = "0.0.0.0:6789""#;
        let config: ExitConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.listen.port(), 6789);
        assert_eq!(config.timeouts.handshake_timeout_secs, 5);
        assert_eq!(config.timeouts.connection_backlog, 1024);
    }
}
