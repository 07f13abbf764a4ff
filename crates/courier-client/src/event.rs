use courier_transfer::{ReceivedFile, TransferError};
use courier_types::{ChatMessage, ClientIdentity, FileAnnouncement, FrameError};

/// Something the relay delivered, or the end of the connection.
#[derive(Debug)]
pub enum ClientEvent {
    /// Another client registered.
    PeerJoined(ClientIdentity),
    Chat(ChatMessage),
    /// A transfer was announced and is now being reassembled.
    FileIncoming(FileAnnouncement),
    FileReceived(ReceivedFile),
    /// A chunk was dropped (unannounced, undecodable) or the file could not
    /// be stored.
    TransferFailed(TransferError),
    /// The receive loop ended. `None` means the relay closed the stream
    /// cleanly. Always the last event, unless the `Client` was dropped first.
    ConnectionLost(Option<FrameError>),
}
