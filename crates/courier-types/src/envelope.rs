use serde::{Deserialize, Serialize};

use crate::models::ClientIdentity;

/// Discriminant carried in the `type` field of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Registration,
    Chat,
    FileAnnounce,
    FileChunk,
}

impl EnvelopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Chat => "chat",
            Self::FileAnnounce => "file_announce",
            Self::FileChunk => "file_chunk",
        }
    }
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A text message. No `to_id` (or an empty one) means broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub from_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_id: Option<String>,
    pub message: String,
}

impl ChatMessage {
    pub fn broadcast(from_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: None,
            message: message.into(),
        }
    }

    pub fn direct(
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: Some(to_id.into()),
            message: message.into(),
        }
    }

    pub fn recipient(&self) -> Option<&str> {
        recipient(&self.to_id)
    }
}

/// Opens a transfer. `size` and `chunk_size` are advisory: the receiver
/// finishes on the terminal chunk, never on a byte count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAnnouncement {
    pub from_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_id: Option<String>,
    pub name: String,
    pub size: u64,
    pub chunk_size: u64,
}

impl FileAnnouncement {
    pub fn recipient(&self) -> Option<&str> {
        recipient(&self.to_id)
    }
}

/// One slice of a transfer. `data_b64` is standard base64 so the bytes can
/// ride inside the same JSON framing as everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    pub from_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_id: Option<String>,
    pub file_name: String,
    pub seq: u64,
    pub data_b64: String,
    pub is_last: bool,
}

impl FileChunk {
    pub fn recipient(&self) -> Option<&str> {
        recipient(&self.to_id)
    }
}

fn recipient(to_id: &Option<String>) -> Option<&str> {
    to_id.as_deref().filter(|id| !id.is_empty())
}

/// One unit on the wire.
///
/// On the wire this is a flat object with a `type` tag and one payload field
/// named after the tag. Frames with a missing, mismatched or duplicated
/// payload fail to deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "wire::WireEnvelope", into = "wire::WireEnvelope")]
pub enum Envelope {
    Registration(ClientIdentity),
    Chat(ChatMessage),
    FileAnnounce(FileAnnouncement),
    FileChunk(FileChunk),
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Self::Registration(_) => EnvelopeKind::Registration,
            Self::Chat(_) => EnvelopeKind::Chat,
            Self::FileAnnounce(_) => EnvelopeKind::FileAnnounce,
            Self::FileChunk(_) => EnvelopeKind::FileChunk,
        }
    }

    /// The id the frame claims to come from.
    pub fn sender_id(&self) -> &str {
        match self {
            Self::Registration(identity) => &identity.id,
            Self::Chat(chat) => &chat.from_id,
            Self::FileAnnounce(announce) => &announce.from_id,
            Self::FileChunk(chunk) => &chunk.from_id,
        }
    }

    /// Direct recipient, or `None` for a broadcast.
    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::Registration(_) => None,
            Self::Chat(chat) => chat.recipient(),
            Self::FileAnnounce(announce) => announce.recipient(),
            Self::FileChunk(chunk) => chunk.recipient(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("{kind} frame has no {kind} payload")]
    MissingPayload { kind: EnvelopeKind },
    #[error("{kind} frame carries more than one payload")]
    ConflictingPayloads { kind: EnvelopeKind },
}

mod wire {
    use serde::{Deserialize, Serialize};

    use super::{ChatMessage, Envelope, EnvelopeError, EnvelopeKind, FileAnnouncement, FileChunk};
    use crate::models::ClientIdentity;

    #[derive(Serialize, Deserialize)]
    pub struct WireEnvelope {
        #[serde(rename = "type")]
        kind: EnvelopeKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        registration: Option<ClientIdentity>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chat: Option<ChatMessage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_announce: Option<FileAnnouncement>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_chunk: Option<FileChunk>,
    }

    impl From<Envelope> for WireEnvelope {
        fn from(envelope: Envelope) -> Self {
            let mut wire = WireEnvelope {
                kind: envelope.kind(),
                registration: None,
                chat: None,
                file_announce: None,
                file_chunk: None,
            };
            match envelope {
                Envelope::Registration(identity) => wire.registration = Some(identity),
                Envelope::Chat(chat) => wire.chat = Some(chat),
                Envelope::FileAnnounce(announce) => wire.file_announce = Some(announce),
                Envelope::FileChunk(chunk) => wire.file_chunk = Some(chunk),
            }
            wire
        }
    }

    impl TryFrom<WireEnvelope> for Envelope {
        type Error = EnvelopeError;

        fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
            let populated = [
                wire.registration.is_some(),
                wire.chat.is_some(),
                wire.file_announce.is_some(),
                wire.file_chunk.is_some(),
            ]
            .into_iter()
            .filter(|present| *present)
            .count();

            if populated > 1 {
                return Err(EnvelopeError::ConflictingPayloads { kind: wire.kind });
            }

            let envelope = match wire.kind {
                EnvelopeKind::Registration => wire.registration.map(Envelope::Registration),
                EnvelopeKind::Chat => wire.chat.map(Envelope::Chat),
                EnvelopeKind::FileAnnounce => wire.file_announce.map(Envelope::FileAnnounce),
                EnvelopeKind::FileChunk => wire.file_chunk.map(Envelope::FileChunk),
            };

            envelope.ok_or(EnvelopeError::MissingPayload { kind: wire.kind })
        }
    }
}
