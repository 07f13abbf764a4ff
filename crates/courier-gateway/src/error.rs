use courier_types::{EnvelopeKind, FrameError};

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("framing error: {0}")]
    Framing(#[from] FrameError),
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

/// Why a frame was not routed. Diagnostic only; the connection stays up.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("unknown recipient {to_id}")]
    UnknownRecipient { to_id: String },
    #[error("frame claims sender {claimed} but connection is registered as {actual}")]
    SpoofedSender { claimed: String, actual: String },
    #[error("{kind} frames are handled by the supervisor, not routed")]
    NotRoutable { kind: EnvelopeKind },
    #[error("failed to encode frame: {0}")]
    Encode(#[from] FrameError),
}

/// A single enqueue onto a destination's outbound queue failed.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("outbound queue for connection {conn_id} still full after {timeout_ms} ms")]
    Timeout { conn_id: uuid::Uuid, timeout_ms: u128 },
    #[error("connection {conn_id} is closed")]
    Closed { conn_id: uuid::Uuid },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("client id {id} is already registered")]
    AlreadyRegistered { id: String },
}
