//! Entry node: the relay endpoint clients connect to directly.
//!
//! For each accepted client the entry node opens one tunnel connection to
//! the configured exit node and relays bytes blindly in both directions.
//! It never inspects the stream — the SOCKS negotiation happening inside
//! it belongs to the client and the exit node.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use duohop_core::{relay_pair, ChunkTransform};

use crate::config::{EntryConfig, TimeoutConfig};
use crate::error::NodeError;
use crate::util::{create_listener, ConnectionTracker};

/// A bound entry node, ready to serve.
///
/// Binding and serving are split so callers (and tests) can learn the
/// bound address before the accept loop starts.
pub struct EntryNode {
    listener: tokio::net::TcpListener,
    config: EntryConfig,
    transform: Arc<dyn ChunkTransform>,
}

impl EntryNode {
    /// Bind the listen address with the configured backlog.
    pub fn bind(
        config: EntryConfig,
        transform: Arc<dyn ChunkTransform>,
    ) -> Result<Self, NodeError> {
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

    /// Accept clients until the token is cancelled, then drain.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), NodeError> {
        let listen = self.local_addr()?;
        info!(listen = %listen, exit = %self.config.exit, "entry node listening");

        let exit_addr: Arc<str> = Arc::from(self.config.exit.as_str());
        let timeouts = self.config.timeouts.clone();
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("entry node shutting down");
                    break;
                }

                result = self.listener.accept() => {
                    let (client, peer) = result?;
                    debug!(peer = %peer, "client accepted");

                    let exit_addr = exit_addr.clone();
                    let timeouts = timeouts.clone();
                    let transform = self.transform.clone();
                    let guard = tracker.guard();

                    tokio::spawn(
                        async move {
                            let _guard = guard;
                            if let Err(e) =
                                handle_client(client, &exit_addr, &timeouts, &*transform).await
                            {
                                debug!(error = %e, "entry connection error");
                            }
                        }
                        .instrument(info_span!("entry", peer = %peer)),
                    );
                }
            }
        }

        drain(&tracker, Duration::from_secs(timeouts.shutdown_timeout_secs)).await;
        info!("entry node stopped");
        Ok(())
    }
}

/// Run an entry node until the token is cancelled.
pub async fn run(
    config: EntryConfig,
    transform: Arc<dyn ChunkTransform>,
    shutdown: CancellationToken,
) -> Result<(), NodeError> {
    EntryNode::bind(config, transform)?.serve(shutdown).await
}

/// Open the tunnel for one client and relay until either side ends.
///
/// Both streams live inside `relay_pair`; when it returns — for any reason
/// — client and tunnel are closed together, exactly once.
async fn handle_client(
    client: TcpStream,
    exit_addr: &str,
    timeouts: &TimeoutConfig,
    transform: &dyn ChunkTransform,
) -> Result<(), NodeError> {
    let connect_timeout = Duration::from_secs(timeouts.connect_timeout_secs);
    let idle_timeout = Duration::from_secs(timeouts.idle_timeout_secs);

    let tunnel = match tokio::time::timeout(connect_timeout, TcpStream::connect(exit_addr)).await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(exit = %exit_addr, error = %e, "exit dial failed");
            return Err(e.into());
        }
        Err(_) => {
            warn!(exit = %exit_addr, "exit dial timed out");
            return Err(NodeError::ConnectTimeout(exit_addr.to_string()));
        }
    };

    debug!("tunnel established, starting relay");
    relay_pair(
        client,
        tunnel,
        timeouts.relay_buffer_size,
        idle_timeout,
        transform,
    )
    .await?;
    Ok(())
}

pub(crate) async fn drain(tracker: &ConnectionTracker, timeout: Duration) {
    let active = tracker.count();
    if active > 0 {
        info!("waiting for {} active connections to drain", active);
        if tracker.wait_for_zero(timeout).await {
            info!("all connections drained");
        } else {
            warn!("shutdown timeout, {} connections still active", tracker.count());
        }
    }
}
