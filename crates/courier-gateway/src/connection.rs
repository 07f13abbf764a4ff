use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;
use uuid::Uuid;

use courier_types::FrameWriter;

use crate::error::DeliveryError;

/// Write side of one client connection.
///
/// Cloning is cheap. Every clone feeds the same bounded queue, which a single
/// writer task drains onto the socket, so concurrent senders never interleave
/// partial frames.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    inner: Arc<ConnectionInner>,
}

#[derive(Debug)]
struct ConnectionInner {
    id: Uuid,
    peer: SocketAddr,
    outbound: mpsc::Sender<Bytes>,
    closer: CancellationToken,
    send_timeout: Duration,
}

impl ConnectionHandle {
    pub fn new(
        peer: SocketAddr,
        outbound: mpsc::Sender<Bytes>,
        closer: CancellationToken,
        send_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id: Uuid::new_v4(),
                peer,
                outbound,
                closer,
                send_timeout,
            }),
        }
    }

    /// A handle plus the receiving end of its queue, for callers that drain
    /// the queue themselves.
    pub fn channel(
        peer: SocketAddr,
        capacity: usize,
        send_timeout: Duration,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(peer, tx, CancellationToken::new(), send_timeout), rx)
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.inner.peer
    }

    /// Queue an encoded frame, waiting at most `send_timeout` for room.
    pub async fn send(&self, frame: Bytes) -> Result<(), DeliveryError> {
        match self
            .inner
            .outbound
            .send_timeout(frame, self.inner.send_timeout)
            .await
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(DeliveryError::Timeout {
                conn_id: self.inner.id,
                timeout_ms: self.inner.send_timeout.as_millis(),
            }),
            Err(SendTimeoutError::Closed(_)) => Err(DeliveryError::Closed {
                conn_id: self.inner.id,
            }),
        }
    }

    /// Force the connection closed. Its read loop and writer task both stop.
    pub fn close(&self) {
        self.inner.closer.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closer.is_cancelled() || self.inner.outbound.is_closed()
    }

    /// Resolves once `close` has been called (or the server is shutting down).
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.inner.closer.cancelled()
    }
}

/// Drain a connection's queue onto its socket until the queue closes, a write
/// fails, or the connection is cancelled.
pub(crate) async fn run_writer<W: AsyncWrite + Unpin>(
    mut writer: FrameWriter<W>,
    mut outbound: mpsc::Receiver<Bytes>,
    closer: CancellationToken,
    conn_id: Uuid,
) {
    loop {
        let frame = tokio::select! {
            _ = closer.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let written = tokio::select! {
            _ = closer.cancelled() => break,
            written = writer.send_raw(&frame) => written,
        };
        if let Err(e) = written {
            debug!("Writer for connection {} stopped: {}", conn_id, e);
            break;
        }
    }

    let _ = writer.shutdown().await;
}
