use bytes::Bytes;
use futures_util::future::join_all;
use tracing::{debug, trace, warn};

use courier_types::codec;
use courier_types::{
    ChatMessage, ClientIdentity, Envelope, EnvelopeKind, FileAnnouncement, FileChunk, InboundFrame,
};

use crate::error::RouteError;
use crate::registry::{RegisteredClient, Registry};

/// Outcome of routing one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Resolves destinations for frames from registered clients and enqueues them.
///
/// Broadcasts go to every registered client except the sender. Delivery is
/// best effort: a failed enqueue is logged and counted, never retried, and
/// never reported back to the sender.
#[derive(Clone)]
pub struct Router {
    registry: Registry,
}

impl Router {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Route any frame a registered client sent.
    pub async fn route(
        &self,
        sender: &ClientIdentity,
        frame: InboundFrame,
    ) -> Result<Delivery, RouteError> {
        let InboundFrame { envelope, raw } = frame;
        match envelope {
            Envelope::Registration(_) => Err(RouteError::NotRoutable {
                kind: EnvelopeKind::Registration,
            }),
            Envelope::Chat(chat) => self.route_chat(sender, chat).await,
            Envelope::FileAnnounce(announce) => self.route_file(sender, &announce, raw).await,
            Envelope::FileChunk(chunk) => self.route_file_chunk(sender, &chunk, raw).await,
        }
    }

    /// Chats are re-encoded before delivery.
    pub async fn route_chat(
        &self,
        sender: &ClientIdentity,
        chat: ChatMessage,
    ) -> Result<Delivery, RouteError> {
        check_sender(sender, &chat.from_id)?;
        let to_id = chat.recipient().map(str::to_owned);
        let frame = codec::encode(&Envelope::Chat(chat))?;
        self.deliver(sender, to_id.as_deref(), frame).await
    }

    /// File frames are forwarded exactly as received.
    pub async fn route_file(
        &self,
        sender: &ClientIdentity,
        announce: &FileAnnouncement,
        raw: Bytes,
    ) -> Result<Delivery, RouteError> {
        check_sender(sender, &announce.from_id)?;
        debug!(
            "{} announces {} ({} bytes) to {}",
            sender,
            announce.name,
            announce.size,
            announce.recipient().unwrap_or("everyone")
        );
        self.deliver(sender, announce.recipient(), raw).await
    }

    pub async fn route_file_chunk(
        &self,
        sender: &ClientIdentity,
        chunk: &FileChunk,
        raw: Bytes,
    ) -> Result<Delivery, RouteError> {
        check_sender(sender, &chunk.from_id)?;
        trace!("{} chunk {} of {}", sender.id, chunk.seq, chunk.file_name);
        self.deliver(sender, chunk.recipient(), raw).await
    }

    /// Echo a fresh registration to everyone else.
    pub async fn announce_join(&self, identity: &ClientIdentity) -> Result<Delivery, RouteError> {
        let frame = codec::encode(&Envelope::Registration(identity.clone()))?;
        Ok(self.broadcast(&identity.id, frame).await)
    }

    async fn deliver(
        &self,
        sender: &ClientIdentity,
        to_id: Option<&str>,
        frame: Bytes,
    ) -> Result<Delivery, RouteError> {
        let Some(to_id) = to_id else {
            return Ok(self.broadcast(&sender.id, frame).await);
        };

        let Some(connection) = self.registry.lookup(to_id).await else {
            return Err(RouteError::UnknownRecipient {
                to_id: to_id.to_string(),
            });
        };

        match connection.send(frame).await {
            Ok(()) => Ok(Delivery {
                delivered: 1,
                failed: 0,
            }),
            Err(e) => {
                warn!("Delivery from {} to {} failed: {}", sender.id, to_id, e);
                Ok(Delivery {
                    delivered: 0,
                    failed: 1,
                })
            }
        }
    }

    async fn broadcast(&self, sender_id: &str, frame: Bytes) -> Delivery {
        let targets: Vec<RegisteredClient> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|client| client.identity.id != sender_id)
            .collect();

        let results = join_all(
            targets
                .iter()
                .map(|client| client.connection.send(frame.clone())),
        )
        .await;

        let mut delivery = Delivery::default();
        for (client, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    warn!("Broadcast from {} to {} failed: {}", sender_id, client.identity, e);
                    delivery.failed += 1;
                }
            }
        }
        delivery
    }
}

fn check_sender(sender: &ClientIdentity, claimed: &str) -> Result<(), RouteError> {
    if claimed == sender.id {
        Ok(())
    } else {
        Err(RouteError::SpoofedSender {
            claimed: claimed.to_string(),
            actual: sender.id.clone(),
        })
    }
}
