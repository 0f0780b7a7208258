//! Error types for the node crate.

use std::fmt;

use duohop_core::TransferError;

/// Errors that can occur while running an entry or exit node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("SOCKS error: {0}")]
    Socks(#[from] SocksError),

    #[error("negotiation timed out")]
    HandshakeTimeout,

    #[error("connect timeout to {0}")]
    ConnectTimeout(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Destination-negotiation protocol errors.
///
/// Any of these closes the tunnel connection without starting a relay; no
/// reply is sent for version, command, or address-type errors.
#[derive(Debug)]
pub enum SocksError {
    InvalidVersion(u8),
    UnsupportedCommand(u8),
    UnsupportedAddressType(u8),
    /// The greeting or request ended before the record was complete.
    Truncated,
    /// Domain name bytes were not valid text.
    InvalidDomain,
    /// Transport failure while the negotiation was in flight.
    Io(std::io::Error),
}

impl fmt::Display for SocksError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVersion(v) => write!(f, "invalid SOCKS version: 0x{v:02x}"),
            Self::UnsupportedCommand(c) => write!(f, "unsupported command: 0x{c:02x}"),
            Self::UnsupportedAddressType(a) => write!(f, "unsupported address type: 0x{a:02x}"),
            Self::Truncated => write!(f, "truncated negotiation record"),
            Self::InvalidDomain => write!(f, "domain name is not valid text"),
            Self::Io(e) => write!(f, "io during negotiation: {e}"),
        }
    }
}

impl std::error::Error for SocksError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}
