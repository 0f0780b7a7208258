//! Bidirectional byte relay with a pluggable per-chunk transform.
//!
//! Both the entry and exit nodes relay traffic with the same primitive: a
//! pair of forwarding directions over two live streams, joined in a single
//! future. Payload processing (a future cipher or compressor) is abstracted
//! via the [`ChunkTransform`] trait; the default [`Identity`] transform
//! passes chunks through untouched.
//!
//! Each direction is driven as an independent poll-based state machine
//! within one future, so back-pressure on one direction never stalls the
//! other. There is no buffering beyond one chunk per direction: a full
//! write (and flush) completes before the next read. A fast producer can
//! still fill the kernel's socket buffers on the slow side; that is left to
//! the transport.
//!
//! Because the single owning future holds both streams, cleanup is
//! inherently one-shot: when it returns — success, error, or idle timeout —
//! both streams are dropped (closed) exactly once, which unblocks whatever
//! the peers had in flight.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant as TokioInstant;

/// One forwarding direction of a relay pair.
///
/// For the entry node, uplink is client → tunnel; for the exit node it is
/// tunnel → target. The direction is handed to the transform so a single
/// implementation can treat the two flows differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// First stream → second stream (a → b).
    Uplink,
    /// Second stream → first stream (b → a).
    Downlink,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Uplink => f.write_str("uplink"),
            Direction::Downlink => f.write_str("downlink"),
        }
    }
}

/// A read or write failure on one forwarding direction.
///
/// Orderly EOF is not an error; this is produced only for genuine transport
/// failures, carrying which direction failed and the underlying cause.
#[derive(Debug, thiserror::Error)]
#[error("{direction} transfer failed: {source}")]
pub struct TransferError {
    pub direction: Direction,
    #[source]
    pub source: io::Error,
}

/// Per-chunk payload transform.
///
/// Implementors receive each chunk read from the source and produce the
/// bytes to write to the destination into `output` (cleared before each
/// call). The output may differ in length from the input. Implementations
/// must not keep references to `input` beyond the call.
pub trait ChunkTransform: Send + Sync {
    fn apply(&self, direction: Direction, input: &[u8], output: &mut Vec<u8>);
}

/// Pass-through transform: the relayed bytes are forwarded unmodified.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl ChunkTransform for Identity {
    #[inline]
    fn apply(&self, _direction: Direction, input: &[u8], output: &mut Vec<u8>) {
        output.extend_from_slice(input);
    }
}

/// State machine for one-directional copy with flush.
enum CopyState {
    Reading,
    Writing(usize), // pos into the staged chunk
    Flushing(usize), // bytes flushing
    ShuttingDown,
    Done,
}

/// Result of polling one copy direction.
enum CopyPoll {
    /// A transformed chunk was fully written and flushed.
    Flushed(usize),
    /// Direction finished (EOF + shutdown of the write side).
    Finished,
}

/// Poll-driven one-directional copy: read → transform → write → flush.
#[allow(clippy::too_many_arguments)]
fn poll_copy_direction<R, W, T>(
    cx: &mut Context<'_>,
    reader: &mut R,
    writer: &mut W,
    buf: &mut [u8],
    staged: &mut Vec<u8>,
    state: &mut CopyState,
    transform: &T,
    direction: Direction,
) -> Poll<io::Result<CopyPoll>>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
    T: ChunkTransform + ?Sized,
{
    loop {
        match state {
            CopyState::Reading => {
                let mut read_buf = ReadBuf::new(buf);
                match Pin::new(&mut *reader).poll_read(cx, &mut read_buf) {
                    Poll::Ready(Ok(())) => {
                        let n = read_buf.filled().len();
                        if n == 0 {
                            *state = CopyState::ShuttingDown;
                        } else {
                            staged.clear();
                            transform.apply(direction, &buf[..n], staged);
                            if !staged.is_empty() {
                                *state = CopyState::Writing(0);
                            }
                            // An empty transformed chunk has nothing to
                            // write; stay in Reading.
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::Writing(pos) => {
                match Pin::new(&mut *writer).poll_write(cx, &staged[*pos..]) {
                    Poll::Ready(Ok(n)) => {
                        *pos += n;
                        if *pos >= staged.len() {
                            *state = CopyState::Flushing(staged.len());
                        }
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::Flushing(bytes) => {
                let bytes = *bytes;
                match Pin::new(&mut *writer).poll_flush(cx) {
                    Poll::Ready(Ok(())) => {
                        *state = CopyState::Reading;
                        return Poll::Ready(Ok(CopyPoll::Flushed(bytes)));
                    }
                    Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                    Poll::Pending => return Poll::Pending,
                }
            }
            CopyState::ShuttingDown => match Pin::new(&mut *writer).poll_shutdown(cx) {
                Poll::Ready(_) => {
                    *state = CopyState::Done;
                    return Poll::Ready(Ok(CopyPoll::Finished));
                }
                Poll::Pending => return Poll::Pending,
            },
            CopyState::Done => return Poll::Ready(Ok(CopyPoll::Finished)),
        }
    }
}

/// Forward one direction: read chunks from `reader`, transform them, and
/// write them in full to `writer` until EOF.
///
/// A zero-length read is orderly stream end and finishes without error
/// (after shutting down the write side). Returns the number of bytes
/// written. Any transport failure is reported with the failing `direction`
/// attached.
pub async fn forward<R, W, T>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
    transform: &T,
    direction: Direction,
) -> Result<u64, TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
    T: ChunkTransform + ?Sized,
{
    let mut buf = vec![0u8; buffer_size];
    let mut staged = Vec::with_capacity(buffer_size);
    let mut state = CopyState::Reading;
    let mut total: u64 = 0;

    std::future::poll_fn(|cx| loop {
        match poll_copy_direction(
            cx,
            reader,
            writer,
            &mut buf,
            &mut staged,
            &mut state,
            transform,
            direction,
        ) {
            Poll::Ready(Ok(CopyPoll::Flushed(n))) => total += n as u64,
            Poll::Ready(Ok(CopyPoll::Finished)) => return Poll::Ready(Ok(())),
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        }
    })
    .await
    .map_err(|source| TransferError { direction, source })?;

    Ok(total)
}

/// Relay bytes between `a` and `b` in both directions until both finish.
///
/// Both directions run concurrently within this single future using
/// poll-based I/O, so back-pressure on one direction cannot stall the
/// other. The uplink (a → b) and downlink (b → a) each preserve their own
/// byte order; there is no ordering between the two.
///
/// The future owns both streams: when it completes — both directions done,
/// a transport error on either, or neither direction moving data within
/// `idle_timeout` — both streams are dropped and thereby closed exactly
/// once. Dropping an already dead socket is a no-op, so racing peer closes
/// are harmless.
pub async fn relay_pair<A, B, T>(
    a: A,
    b: B,
    buffer_size: usize,
    idle_timeout: Duration,
    transform: &T,
) -> Result<(), TransferError>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
    T: ChunkTransform + ?Sized,
{
    let (mut a_r, mut a_w) = tokio::io::split(a);
    let (mut b_r, mut b_w) = tokio::io::split(b);

    let mut buf_up = vec![0u8; buffer_size];
    let mut buf_down = vec![0u8; buffer_size];
    let mut staged_up = Vec::with_capacity(buffer_size);
    let mut staged_down = Vec::with_capacity(buffer_size);
    let mut state_up = CopyState::Reading;
    let mut state_down = CopyState::Reading;

    let idle_sleep = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle_sleep);

    let mut up_done = false;
    let mut down_done = false;

    loop {
        if up_done && down_done {
            return Ok(());
        }

        // Poll both directions under one waker registration each, so either
        // can make progress independently.
        let both = std::future::poll_fn(|cx| {
            let mut any_ready = false;
            let mut activity = false;
            let mut error: Option<TransferError> = None;

            if !up_done {
                match poll_copy_direction(
                    cx,
                    &mut a_r,
                    &mut b_w,
                    &mut buf_up,
                    &mut staged_up,
                    &mut state_up,
                    transform,
                    Direction::Uplink,
                ) {
                    Poll::Ready(Ok(CopyPoll::Flushed(_))) => {
                        activity = true;
                        any_ready = true;
                    }
                    Poll::Ready(Ok(CopyPoll::Finished)) => {
                        up_done = true;
                        any_ready = true;
                    }
                    Poll::Ready(Err(source)) => {
                        error = Some(TransferError {
                            direction: Direction::Uplink,
                            source,
                        });
                        any_ready = true;
                    }
                    Poll::Pending => {}
                }
            }

            if !down_done {
                match poll_copy_direction(
                    cx,
                    &mut b_r,
                    &mut a_w,
                    &mut buf_down,
                    &mut staged_down,
                    &mut state_down,
                    transform,
                    Direction::Downlink,
                ) {
                    Poll::Ready(Ok(CopyPoll::Flushed(_))) => {
                        activity = true;
                        any_ready = true;
                    }
                    Poll::Ready(Ok(CopyPoll::Finished)) => {
                        down_done = true;
                        any_ready = true;
                    }
                    Poll::Ready(Err(source)) => {
                        error = Some(TransferError {
                            direction: Direction::Downlink,
                            source,
                        });
                        any_ready = true;
                    }
                    Poll::Pending => {}
                }
            }

            if let Some(e) = error {
                return Poll::Ready(Err(e));
            }

            if any_ready {
                Poll::Ready(Ok(activity))
            } else {
                Poll::Pending
            }
        });

        tokio::select! {
            result = both => {
                let activity = result?;
                if activity {
                    idle_sleep.as_mut().reset(TokioInstant::now() + idle_timeout);
                }
            }
            _ = &mut idle_sleep => {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    /// XOR transform; same length, direction-independent.
    struct Xor(u8);

    impl ChunkTransform for Xor {
        fn apply(&self, _direction: Direction, input: &[u8], output: &mut Vec<u8>) {
            output.extend(input.iter().map(|b| b ^ self.0));
        }
    }

    /// Doubles every byte on the uplink only, to exercise length changes.
    struct DoubleUplink;

    impl ChunkTransform for DoubleUplink {
        fn apply(&self, direction: Direction, input: &[u8], output: &mut Vec<u8>) {
            match direction {
                Direction::Uplink => {
                    for &b in input {
                        output.push(b);
                        output.push(b);
                    }
                }
                Direction::Downlink => output.extend_from_slice(input),
            }
        }
    }

    const BUF: usize = 1024;

    #[tokio::test]
    async fn forward_reproduces_payload_at_boundary_sizes() {
        for len in [0usize, 1, BUF, BUF + 1, 7 * BUF + 13] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let (mut src_w, mut src_r) = duplex(256);
            let (mut dst_w, mut dst_r) = duplex(256);

            let sent = payload.clone();
            let writer = tokio::spawn(async move {
                src_w.write_all(&sent).await.unwrap();
                src_w.shutdown().await.unwrap();
            });

            let pump = tokio::spawn(async move {
                forward(&mut src_r, &mut dst_w, BUF, &Identity, Direction::Uplink).await
            });

            let mut received = Vec::new();
            dst_r.read_to_end(&mut received).await.unwrap();
            assert_eq!(received, payload, "payload length {len}");
            assert_eq!(pump.await.unwrap().unwrap(), len as u64);
            writer.await.unwrap();
        }
    }

    #[tokio::test]
    async fn relay_pair_basic() {
        let (client, a_side) = duplex(1024);
        let (b_side, target) = duplex(1024);

        let relay = tokio::spawn(async move {
            relay_pair(a_side, b_side, 1024, Duration::from_secs(5), &Identity).await
        });

        let (mut client_r, mut client_w) = tokio::io::split(client);
        let (mut target_r, mut target_w) = tokio::io::split(target);

        client_w.write_all(b"hello").await.unwrap();
        client_w.shutdown().await.unwrap();

        let mut buf = vec![0u8; 1024];
        let n = target_r.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");

        target_w.write_all(b"world").await.unwrap();
        target_w.shutdown().await.unwrap();

        let n = client_r.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"world");

        relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn relay_pair_applies_transform_per_direction() {
        let (client, a_side) = duplex(1024);
        let (b_side, target) = duplex(1024);

        let relay = tokio::spawn(async move {
            relay_pair(a_side, b_side, 1024, Duration::from_secs(5), &DoubleUplink).await
        });

        let (mut client_r, mut client_w) = tokio::io::split(client);
        let (mut target_r, mut target_w) = tokio::io::split(target);

        client_w.write_all(b"ab").await.unwrap();
        client_w.shutdown().await.unwrap();

        let mut buf = vec![0u8; 16];
        let mut got = Vec::new();
        loop {
            let n = target_r.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, b"aabb");

        target_w.write_all(b"cd").await.unwrap();
        target_w.shutdown().await.unwrap();

        let mut got = Vec::new();
        client_r.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"cd");

        relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn xor_round_trips_through_two_pairs() {
        // client → [xor] → middle → [xor] → target: the target sees plaintext.
        let (client, a1) = duplex(1024);
        let (b1, a2) = duplex(1024);
        let (b2, target) = duplex(1024);

        let r1 = tokio::spawn(async move {
            relay_pair(a1, b1, 1024, Duration::from_secs(5), &Xor(0x5a)).await
        });
        let r2 = tokio::spawn(async move {
            relay_pair(a2, b2, 1024, Duration::from_secs(5), &Xor(0x5a)).await
        });

        let (_client_r, mut client_w) = tokio::io::split(client);
        let (mut target_r, mut target_w) = tokio::io::split(target);

        client_w.write_all(b"secret").await.unwrap();
        client_w.shutdown().await.unwrap();

        let mut buf = vec![0u8; 16];
        let n = target_r.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"secret");

        target_w.shutdown().await.unwrap();
        r1.await.unwrap().unwrap();
        r2.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn relay_pair_idle_timeout() {
        let (client, a_side) = duplex(1024);
        let (b_side, _target) = duplex(1024);

        let start = TokioInstant::now();
        let result =
            relay_pair(a_side, b_side, 1024, Duration::from_millis(50), &Identity).await;

        result.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));

        drop(client);
    }

    #[tokio::test]
    async fn racing_peer_closes_tear_down_without_panic() {
        let (client, a_side) = duplex(64);
        let (b_side, target) = duplex(64);

        let relay = tokio::spawn(async move {
            relay_pair(a_side, b_side, 64, Duration::from_secs(5), &Identity).await
        });

        let (client_r, mut client_w) = tokio::io::split(client);
        client_w.write_all(b"x").await.unwrap();

        // Both peers vanish at once, possibly with the chunk still in
        // flight. The relay owns its streams, so each is closed exactly
        // once during teardown no matter which direction fails first.
        drop(client_r);
        drop(client_w);
        drop(target);

        let result = tokio::time::timeout(Duration::from_secs(1), relay)
            .await
            .expect("relay did not tear down")
            .unwrap();
        // Clean EOF or a reported transfer error are both acceptable;
        // a panic or hang is not.
        drop(result);
    }

    #[tokio::test]
    async fn eof_on_one_side_finishes_cleanly() {
        let (client, a_side) = duplex(1024);
        let (b_side, target) = duplex(1024);

        let relay = tokio::spawn(async move {
            relay_pair(a_side, b_side, 1024, Duration::from_secs(5), &Identity).await
        });

        // Closing both client halves EOFs the uplink; the downlink then
        // sees EOF once the relay drops its side of the pair.
        drop(client);
        drop(target);

        tokio::time::timeout(Duration::from_secs(1), relay)
            .await
            .expect("relay did not finish after peer close")
            .unwrap()
            .unwrap();
    }
}
