use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use courier_transfer::{FileReceiver, FileStorage, open_file};
use courier_types::{ChatMessage, ClientIdentity, Envelope, FrameReader, FrameWriter};

use crate::event::ClientEvent;

const EVENT_QUEUE_CAPACITY: usize = 256;

static NEXT_CLIENT: AtomicU64 = AtomicU64::new(0);

/// `client_<name>_<pid>_<n>`. Unique within this process and, in practice,
/// across processes on one host.
pub fn generate_client_id(name: &str) -> String {
    let n = NEXT_CLIENT.fetch_add(1, Ordering::Relaxed);
    format!("client_{}_{}_{}", name, std::process::id(), n)
}

/// A registered connection to a relay.
///
/// Outbound envelopes go through one lock so concurrent sends (a chat while
/// a file is streaming) never interleave inside a frame.
pub struct Client {
    identity: ClientIdentity,
    writer: Mutex<FrameWriter<OwnedWriteHalf>>,
    receive_task: JoinHandle<()>,
}

impl Client {
    /// Connect, register under a generated id, and start the receive loop.
    /// Received files are stored under `download_dir` through `storage`.
    pub async fn connect<A, S>(
        addr: A,
        name: &str,
        storage: S,
        download_dir: impl Into<PathBuf>,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>)>
    where
        A: ToSocketAddrs,
        S: FileStorage + 'static,
    {
        let stream = TcpStream::connect(addr)
            .await
            .context("failed to connect to relay")?;
        socket2::SockRef::from(&stream).set_nodelay(true)?;

        let identity = ClientIdentity::new(generate_client_id(name), name);
        let (reader, writer) = stream.into_split();
        let mut writer = FrameWriter::new(writer);
        writer
            .send(&Envelope::Registration(identity.clone()))
            .await
            .context("failed to register")?;
        info!("Connected as {}", identity);

        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let files = FileReceiver::new(storage, download_dir);
        let receive_task = tokio::spawn(receive_loop(
            FrameReader::new(reader),
            files,
            identity.id.clone(),
            events_tx,
        ));

        Ok((
            Self {
                identity,
                writer: Mutex::new(writer),
                receive_task,
            },
            events_rx,
        ))
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        self.writer
            .lock()
            .await
            .send(envelope)
            .await
            .with_context(|| format!("failed to send {}", envelope.kind()))
    }

    pub async fn send_chat(&self, to_id: &str, text: &str) -> Result<()> {
        let chat = ChatMessage::direct(self.identity.id.clone(), to_id, text);
        self.send(&Envelope::Chat(chat)).await
    }

    pub async fn broadcast(&self, text: &str) -> Result<()> {
        let chat = ChatMessage::broadcast(self.identity.id.clone(), text);
        self.send(&Envelope::Chat(chat)).await
    }

    /// Stream a file to `to_id`, or to everyone when `None`. Returns the
    /// number of file bytes sent.
    pub async fn send_file(&self, path: &Path, to_id: Option<&str>) -> Result<u64> {
        let (announcement, mut sender) =
            open_file(path, &self.identity.id, to_id.map(str::to_owned)).await?;

        self.send(&announcement).await?;
        while let Some(chunk) = sender
            .next_chunk()
            .await
            .with_context(|| format!("failed to read {}", path.display()))?
        {
            self.send(&chunk).await?;
        }

        info!(
            "Sent {} ({} bytes) to {}",
            path.display(),
            sender.bytes_sent(),
            to_id.unwrap_or("everyone")
        );
        Ok(sender.bytes_sent())
    }

    /// Stop sending. The relay then closes its side, and the receive loop
    /// finishes with `ConnectionLost`.
    pub async fn close(&self) -> Result<()> {
        self.writer.lock().await.shutdown().await?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        !self.receive_task.is_finished()
    }
}

impl Drop for Client {
    /// Dropping the client stops the receive loop; the event stream ends
    /// without a `ConnectionLost`.
    fn drop(&mut self) {
        self.receive_task.abort();
    }
}

async fn receive_loop<S: FileStorage>(
    mut frames: FrameReader<OwnedReadHalf>,
    mut files: FileReceiver<S>,
    own_id: String,
    events: mpsc::Sender<ClientEvent>,
) {
    let reason = loop {
        let envelope = match frames.next_envelope().await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => break None,
            Err(e) => break Some(e),
        };

        let event = match envelope {
            Envelope::Registration(identity) if identity.id == own_id => None,
            Envelope::Registration(identity) => Some(ClientEvent::PeerJoined(identity)),
            Envelope::Chat(chat) => Some(ClientEvent::Chat(chat)),
            Envelope::FileAnnounce(announce) => {
                files.announce(&announce);
                Some(ClientEvent::FileIncoming(announce))
            }
            Envelope::FileChunk(chunk) => match files.accept_chunk(&chunk).await {
                Ok(Some(received)) => {
                    info!(
                        "Received {} from {} -> {}",
                        received.file_name,
                        received.from_id,
                        received.path.display()
                    );
                    Some(ClientEvent::FileReceived(received))
                }
                Ok(None) => None,
                Err(e) => {
                    warn!("Dropped file chunk: {}", e);
                    Some(ClientEvent::TransferFailed(e))
                }
            },
        };

        if let Some(event) = event {
            // Nobody listening is not a reason to stop reading.
            let _ = events.send(event).await;
        }
    };

    match &reason {
        Some(e) => warn!("Connection to relay lost: {}", e),
        None => debug!("Relay closed the connection"),
    }
    let _ = events.send(ClientEvent::ConnectionLost(reason)).await;
}
