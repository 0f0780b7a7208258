//! Exit node: the relay endpoint that dials the real destination.
//!
//! Each tunnel connection carries one SOCKS5 negotiation (see
//! [`crate::socks`]) followed by raw relayed bytes. A failed negotiation
//! drops the connection without starting a relay; one bad tunnel never
//! affects the others.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use duohop_core::{relay_pair, ChunkTransform};

use crate::config::{ExitConfig, TimeoutConfig};
use crate::entry::drain;
use crate::error::NodeError;
use crate::resolve::dial;
use crate::socks::{self, reply_code_for_dial_error, REPLY_HOST_UNREACHABLE, REPLY_SUCCEEDED};
use crate::util::{create_listener, ConnectionTracker};

/// A bound exit node, ready to serve.
pub struct ExitNode {
    listener: tokio::net::TcpListener,
    config: ExitConfig,
    transform: Arc<dyn ChunkTransform>,
}

impl ExitNode {
    /// Bind the listen address with the configured backlog.
    pub fn bind(config: ExitConfig, transform: Arc<dyn ChunkTransform>) -> Result<Self, NodeError> {
        let listener = create_listener(config.listen, config.timeouts.connection_backlog)?;
        Ok(Self {
            listener,
            config,
            transform,
        })
    }

    /// The actual bound address (resolves port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept tunnel connections until the token is cancelled, then drain.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), NodeError> {
        let listen = self.local_addr()?;
        info!(listen = %listen, "exit node listening");

        let timeouts = self.config.timeouts.clone();
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("exit node shutting down");
                    break;
                }

                result = self.listener.accept() => {
                    let (tunnel, peer) = result?;
                    debug!(peer = %peer, "tunnel accepted");

                    let timeouts = timeouts.clone();
                    let transform = self.transform.clone();
                    let guard = tracker.guard();

                    tokio::spawn(
                        async move {
                            let _guard = guard;
                            if let Err(e) = handle_tunnel(tunnel, &timeouts, &*transform).await {
                                debug!(error = %e, "exit connection error");
                            }
                        }
                        .instrument(info_span!("exit", peer = %peer)),
                    );
                }
            }
        }

        drain(&tracker, Duration::from_secs(timeouts.shutdown_timeout_secs)).await;
        info!("exit node stopped");
        Ok(())
    }
}

/// Run an exit node until the token is cancelled.
pub async fn run(
    config: ExitConfig,
    transform: Arc<dyn ChunkTransform>,
    shutdown: CancellationToken,
) -> Result<(), NodeError> {
    ExitNode::bind(config, transform)?.serve(shutdown).await
}

/// Negotiate the destination, dial it, then relay.
///
/// Protocol errors (bad version, unsupported command or address type,
/// truncated record) close the tunnel with no reply. A dial failure after
/// a well-formed request gets a failure reply before closing.
async fn handle_tunnel(
    mut tunnel: TcpStream,
    timeouts: &TimeoutConfig,
    transform: &dyn ChunkTransform,
) -> Result<(), NodeError> {
    let handshake_timeout = Duration::from_secs(timeouts.handshake_timeout_secs);
    let connect_timeout = Duration::from_secs(timeouts.connect_timeout_secs);
    let idle_timeout = Duration::from_secs(timeouts.idle_timeout_secs);

    let target = match tokio::time::timeout(handshake_timeout, socks::negotiate(&mut tunnel)).await
    {
        Ok(Ok(target)) => target,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(NodeError::HandshakeTimeout),
    };

    debug!(target = %target, "CONNECT");

    let outbound = match tokio::time::timeout(connect_timeout, dial(&target)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(target = %target, error = %e, "destination dial failed");
            let _ = socks::send_reply(&mut tunnel, reply_code_for_dial_error(&e)).await;
            return Err(e.into());
        }
        Err(_) => {
            warn!(target = %target, "destination dial timed out");
            let _ = socks::send_reply(&mut tunnel, REPLY_HOST_UNREACHABLE).await;
            return Err(NodeError::ConnectTimeout(target.to_string()));
        }
    };

    socks::send_reply(&mut tunnel, REPLY_SUCCEEDED).await?;

    debug!("destination connected, starting relay");
    relay_pair(
        tunnel,
        outbound,
        timeouts.relay_buffer_size,
        idle_timeout,
        transform,
    )
    .await?;
    Ok(())
}
