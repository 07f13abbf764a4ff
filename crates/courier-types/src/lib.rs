//! Wire types shared by the courier relay, its clients and the transfer
//! state machine.

pub mod codec;
pub mod envelope;
pub mod models;

pub use codec::{FrameError, FrameReader, FrameWriter, InboundFrame};
pub use envelope::{ChatMessage, Envelope, EnvelopeKind, FileAnnouncement, FileChunk};
pub use models::ClientIdentity;
