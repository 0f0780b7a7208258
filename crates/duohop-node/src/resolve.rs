//! Destination dialing, including domain resolution.

use std::io;

use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

use crate::socks::TargetAddr;

/// Dial the negotiated destination.
///
/// IP targets connect directly. Domain names are resolved through the
/// system resolver at dial time and the candidates are tried in
/// resolver-returned order until one connects; resolution yielding no
/// usable address is reported as a dial failure.
pub async fn dial(target: &TargetAddr) -> io::Result<TcpStream> {
    match target {
        TargetAddr::Ip(addr) => TcpStream::connect(addr).await,
        TargetAddr::Domain(host, port) => {
            let mut last_err: Option<io::Error> = None;
            for addr in lookup_host((host.as_str(), *port)).await? {
                match TcpStream::connect(addr).await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        debug!(candidate = %addr, error = %e, "dial candidate failed");
                        last_err = Some(e);
                    }
                }
            }
            Err(last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")
            }))
        }
    }
}
