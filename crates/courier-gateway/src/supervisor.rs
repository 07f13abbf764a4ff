//! Accept loop and per-connection read loop.
//!
//! Each accepted socket is split: the write half belongs to a writer task
//! draining the connection's outbound queue, the read half to the read loop
//! below. A connection moves through
//! `Accepted → AwaitingRegistration → Registered → Closed`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use courier_types::{ClientIdentity, Envelope, FrameReader, FrameWriter, InboundFrame};

use crate::config::GatewayConfig;
use crate::connection::{ConnectionHandle, run_writer};
use crate::error::GatewayError;
use crate::registry::Registry;
use crate::router::Router;

/// Pause after a failed accept so a persistent error can't spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Where a connection is in its lifecycle between accept and close.
enum Session {
    AwaitingRegistration,
    Registered(ClientIdentity),
}

/// Owns the registry and router and runs the accept loop.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    registry: Registry,
    router: Router,
    config: GatewayConfig,
}

impl Supervisor {
    pub fn new(config: GatewayConfig) -> Self {
        let registry = Registry::new();
        Self {
            inner: Arc::new(SupervisorInner {
                router: Router::new(registry.clone()),
                registry,
                config,
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Force-close a registered client. Its read loop unregisters it.
    pub async fn disconnect(&self, id: &str) -> bool {
        match self.inner.registry.lookup(id).await {
            Some(connection) => {
                connection.close();
                true
            }
            None => false,
        }
    }

    /// Accept connections until `shutdown` fires, then close every connection
    /// and wait for their tasks to finish.
    pub async fn run(self, listener: TcpListener, shutdown: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            info!("Relay listening on {}", addr);
        }

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("New connection from {}", peer);
                        let supervisor = self.clone();
                        let closer = shutdown.child_token();
                        connections.spawn(async move {
                            if let Err(e) = supervisor.handle_connection(stream, peer, closer).await {
                                warn!("Connection from {} ended with error: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);
        let drained = self.inner.registry.drain().await;
        info!(
            "Relay shutting down: closed {} registered clients, waiting on {} connections",
            drained.len(),
            connections.len()
        );
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                error!("Connection task failed: {}", e);
            }
        }
        info!("Relay stopped");
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        closer: CancellationToken,
    ) -> Result<(), GatewayError> {
        let sock_ref = socket2::SockRef::from(&stream);
        sock_ref.set_nodelay(true)?;
        sock_ref.set_keepalive(true)?;

        let (reader, writer) = stream.into_split();
        let config = &self.inner.config;

        let (tx, rx) = mpsc::channel::<Bytes>(config.outbound_capacity);
        let connection = ConnectionHandle::new(peer, tx, closer.clone(), config.send_timeout);
        let conn_id = connection.id();

        let write_handle = tokio::spawn(run_writer(
            FrameWriter::new(writer),
            rx,
            closer.clone(),
            conn_id,
        ));

        let mut frames = FrameReader::with_max_frame_size(reader, config.max_frame_size);
        let result = self.read_loop(&mut frames, &connection).await;

        // Closed
        closer.cancel();
        write_handle.abort();
        match self.inner.registry.unregister(conn_id).await {
            Some(identity) => info!("{} disconnected from {}", identity, peer),
            None => debug!("Unregistered connection {} from {} closed", conn_id, peer),
        }

        result
    }

    async fn read_loop<R: AsyncRead + Unpin>(
        &self,
        frames: &mut FrameReader<R>,
        connection: &ConnectionHandle,
    ) -> Result<(), GatewayError> {
        let mut session = Session::AwaitingRegistration;

        loop {
            let frame = tokio::select! {
                _ = connection.closed() => return Ok(()),
                frame = frames.next_frame() => frame?,
            };
            let Some(frame) = frame else {
                return Ok(());
            };

            match &session {
                Session::AwaitingRegistration => {
                    if let Some(identity) = self.register(frame.envelope, connection).await {
                        session = Session::Registered(identity);
                    }
                }
                Session::Registered(identity) => self.dispatch(identity, frame).await,
            }
        }
    }

    /// Handle a frame from a connection that has not registered yet.
    /// Anything other than a usable registration is dropped.
    async fn register(
        &self,
        envelope: Envelope,
        connection: &ConnectionHandle,
    ) -> Option<ClientIdentity> {
        let peer = connection.peer();
        let Envelope::Registration(identity) = envelope else {
            warn!(
                "{} sent {} before registering, dropping",
                peer,
                envelope.kind()
            );
            return None;
        };

        if identity.id.is_empty() {
            warn!("{} tried to register with an empty id", peer);
            return None;
        }

        if let Err(e) = self
            .inner
            .registry
            .register(identity.clone(), connection.clone())
            .await
        {
            warn!("Registration from {} refused: {}", peer, e);
            return None;
        }

        info!("{} registered from {}", identity, peer);
        match self.inner.router.announce_join(&identity).await {
            Ok(delivery) => debug!("Join of {} announced to {} clients", identity.id, delivery.delivered),
            Err(e) => warn!("Failed to announce join of {}: {}", identity.id, e),
        }
        Some(identity)
    }

    async fn dispatch(&self, identity: &ClientIdentity, frame: InboundFrame) {
        if let Envelope::Registration(again) = &frame.envelope {
            warn!(
                "{} sent another registration (as {}), ignoring",
                identity, again.id
            );
            return;
        }

        let kind = frame.envelope.kind();
        match self.inner.router.route(identity, frame).await {
            Ok(delivery) => trace!(
                "{} from {}: delivered={} failed={}",
                kind, identity.id, delivery.delivered, delivery.failed
            ),
            Err(e) => warn!("Dropped {} from {}: {}", kind, identity.id, e),
        }
    }
}
