/// Structured transfer logging.
///
/// The sender and the receiver report every state change as a
/// `TransferLog`. The default sink forwards to `tracing`; tests and quiet
/// embedders can swap in `NullLogger`.

use std::fmt;

use crate::protocol::TransferKey;

/// Structured log entry for a transfer operation.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub key: TransferKey,
    pub event: TransferEvent,
}

/// Transfer events that can be logged.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Receiver: announcement opened a transfer
    Announced { size: u64, chunk_size: u64 },
    /// Receiver: an unfinished transfer was discarded (replaced or corrupt terminal chunk)
    Abandoned { received_bytes: u64 },
    /// Receiver: chunk decoded and appended
    ChunkAppended { seq: u64, size: usize },
    /// Receiver: chunk arrived with an unexpected sequence number
    OutOfOrder { expected: u64, got: u64 },
    /// Receiver: chunk payload could not be decoded
    InvalidChunk { seq: u64, message: String },
    /// Receiver: chunk for a transfer that was never announced
    UnknownTransfer { seq: u64 },
    /// Receiver: terminal chunk seen, bytes handed to storage
    Completed { total_bytes: u64, announced_bytes: u64 },
    /// Sender: chunk handed to the transport
    ChunkSent { seq: u64, size: usize },
    /// Sender: terminal chunk sent
    SendComplete { total_bytes: u64, chunks: u64 },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Announced { size, chunk_size } => {
                write!(f, "announced size={} chunk_size={}", size, chunk_size)
            }
            Self::Abandoned { received_bytes } => {
                write!(f, "abandoned received={}", received_bytes)
            }
            Self::ChunkAppended { seq, size } => {
                write!(f, "chunk_appended seq={} size={}", seq, size)
            }
            Self::OutOfOrder { expected, got } => {
                write!(f, "out_of_order expected={} got={}", expected, got)
            }
            Self::InvalidChunk { seq, message } => {
                write!(f, "invalid_chunk seq={}: {}", seq, message)
            }
            Self::UnknownTransfer { seq } => {
                write!(f, "unknown_transfer seq={}", seq)
            }
            Self::Completed { total_bytes, announced_bytes } => {
                write!(f, "completed bytes={} announced={}", total_bytes, announced_bytes)
            }
            Self::ChunkSent { seq, size } => {
                write!(f, "chunk_sent seq={} size={}", seq, size)
            }
            Self::SendComplete { total_bytes, chunks } => {
                write!(f, "send_complete bytes={} chunks={}", total_bytes, chunks)
            }
        }
    }
}

/// Sink for transfer logs.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        let key = entry.key.to_string();
        match &entry.event {
            TransferEvent::Abandoned { .. }
            | TransferEvent::OutOfOrder { .. }
            | TransferEvent::InvalidChunk { .. }
            | TransferEvent::UnknownTransfer { .. } => {
                tracing::warn!(component = entry.component, transfer = %key, "{}", entry.event);
            }
            TransferEvent::Announced { .. }
            | TransferEvent::Completed { .. }
            | TransferEvent::SendComplete { .. } => {
                tracing::info!(component = entry.component, transfer = %key, "{}", entry.event);
            }
            // per-chunk spam
            TransferEvent::ChunkAppended { .. } | TransferEvent::ChunkSent { .. } => {
                tracing::trace!(component = entry.component, transfer = %key, "{}", entry.event);
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}
