/// Inbound side of a transfer: envelopes → file bytes.
///
/// ```text
/// file_announce ──► open TransferState (replaces a stale one)
/// file_chunk    ──► decode base64, append
/// file_chunk*   ──► append, flush to storage, drop state   (* is_last)
/// ```
///
/// `TransferTable` holds the per-(sender, file name) state and never touches
/// disk. `FileReceiver` wraps it and flushes finished transfers through a
/// `FileStorage`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use courier_types::{FileAnnouncement, FileChunk};

use crate::logging::{TracingLogger, TransferEvent, TransferLog, TransferLogger};
use crate::protocol::{TransferKey, decode_chunk_data};
use crate::storage::FileStorage;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("chunk {seq} for {key} has no matching announcement")]
    UnregisteredChunk { key: TransferKey, seq: u64 },
    #[error("chunk {seq} for {key} is not valid base64: {source}")]
    InvalidChunkData {
        key: TransferKey,
        seq: u64,
        #[source]
        source: base64::DecodeError,
    },
    #[error("failed to store {key}: {source}")]
    Storage {
        key: TransferKey,
        #[source]
        source: std::io::Error,
    },
}

/// Accumulator for one in-progress transfer.
struct TransferState {
    announced_size: u64,
    data: Vec<u8>,
    next_seq: u64,
}

/// Bytes of a transfer whose terminal chunk has arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTransfer {
    pub key: TransferKey,
    pub announced_size: u64,
    pub data: Vec<u8>,
}

/// In-memory reassembly state for every transfer a client is receiving.
pub struct TransferTable {
    transfers: HashMap<TransferKey, TransferState>,
    logger: Arc<dyn TransferLogger>,
}

impl Default for TransferTable {
    fn default() -> Self {
        Self::new(Arc::new(TracingLogger))
    }
}

impl TransferTable {
    pub fn new(logger: Arc<dyn TransferLogger>) -> Self {
        Self {
            transfers: HashMap::new(),
            logger,
        }
    }

    /// Open a transfer. An unfinished transfer under the same key is dropped.
    pub fn announce(&mut self, announce: &FileAnnouncement) {
        let key = TransferKey::of_announcement(announce);

        // Advisory only; cap the preallocation so a bogus size can't balloon memory.
        let capacity = announce.size.min(16 * 1024 * 1024) as usize;
        let state = TransferState {
            announced_size: announce.size,
            data: Vec::with_capacity(capacity),
            next_seq: 0,
        };

        if let Some(stale) = self.transfers.insert(key.clone(), state) {
            self.log(&key, TransferEvent::Abandoned {
                received_bytes: stale.data.len() as u64,
            });
        }
        self.log(&key, TransferEvent::Announced {
            size: announce.size,
            chunk_size: announce.chunk_size,
        });
    }

    /// Feed one chunk. Returns the finished transfer when `chunk.is_last`.
    ///
    /// Undecodable data is skipped and the transfer stays open, unless it is
    /// the terminal chunk, in which case the transfer is discarded.
    pub fn accept_chunk(
        &mut self,
        chunk: &FileChunk,
    ) -> Result<Option<CompletedTransfer>, TransferError> {
        let key = TransferKey::of_chunk(chunk);

        let Some(expected) = self.transfers.get(&key).map(|state| state.next_seq) else {
            self.log(&key, TransferEvent::UnknownTransfer { seq: chunk.seq });
            return Err(TransferError::UnregisteredChunk { key, seq: chunk.seq });
        };

        if chunk.seq != expected {
            self.log(&key, TransferEvent::OutOfOrder {
                expected,
                got: chunk.seq,
            });
        }

        let bytes = match decode_chunk_data(&chunk.data_b64) {
            Ok(bytes) => bytes,
            Err(source) => {
                self.log(&key, TransferEvent::InvalidChunk {
                    seq: chunk.seq,
                    message: source.to_string(),
                });
                if chunk.is_last {
                    if let Some(stale) = self.transfers.remove(&key) {
                        self.log(&key, TransferEvent::Abandoned {
                            received_bytes: stale.data.len() as u64,
                        });
                    }
                }
                return Err(TransferError::InvalidChunkData {
                    key,
                    seq: chunk.seq,
                    source,
                });
            }
        };

        if let Some(state) = self.transfers.get_mut(&key) {
            state.next_seq = chunk.seq.saturating_add(1);
            state.data.extend_from_slice(&bytes);
        }
        if !bytes.is_empty() {
            self.log(&key, TransferEvent::ChunkAppended {
                seq: chunk.seq,
                size: bytes.len(),
            });
        }

        if !chunk.is_last {
            return Ok(None);
        }

        let Some(state) = self.transfers.remove(&key) else {
            return Ok(None);
        };
        self.log(&key, TransferEvent::Completed {
            total_bytes: state.data.len() as u64,
            announced_bytes: state.announced_size,
        });
        Ok(Some(CompletedTransfer {
            key,
            announced_size: state.announced_size,
            data: state.data,
        }))
    }

    pub fn in_progress(&self) -> usize {
        self.transfers.len()
    }

    pub fn contains(&self, from_id: &str, file_name: &str) -> bool {
        self.transfers
            .contains_key(&TransferKey::new(from_id, file_name))
    }

    fn log(&self, key: &TransferKey, event: TransferEvent) {
        self.logger.log(TransferLog {
            component: "receiver",
            key: key.clone(),
            event,
        });
    }
}

/// A transfer that was reassembled and written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub from_id: String,
    pub file_name: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

/// Reassembles transfers and hands finished ones to a storage backend.
pub struct FileReceiver<S> {
    table: TransferTable,
    storage: S,
    download_dir: PathBuf,
}

impl<S: FileStorage> FileReceiver<S> {
    pub fn new(storage: S, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            table: TransferTable::default(),
            storage,
            download_dir: download_dir.into(),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn TransferLogger>) -> Self {
        self.table = TransferTable::new(logger);
        self
    }

    pub fn announce(&mut self, announce: &FileAnnouncement) {
        self.table.announce(announce);
    }

    /// Feed one chunk; on the terminal chunk the file is written to
    /// `output_path(from_id, file_name)`.
    pub async fn accept_chunk(
        &mut self,
        chunk: &FileChunk,
    ) -> Result<Option<ReceivedFile>, TransferError> {
        let Some(done) = self.table.accept_chunk(chunk)? else {
            return Ok(None);
        };

        let path = self.output_path(&done.key.from_id, &done.key.file_name);
        let stored = async {
            self.storage.ensure_directory(&self.download_dir).await?;
            self.storage.write(&path, &done.data).await
        };
        if let Err(source) = stored.await {
            return Err(TransferError::Storage {
                key: done.key,
                source,
            });
        }

        let sha256 = hex::encode(Sha256::digest(&done.data));
        Ok(Some(ReceivedFile {
            from_id: done.key.from_id,
            file_name: done.key.file_name,
            path,
            bytes: done.data.len() as u64,
            sha256,
        }))
    }

    /// `<download_dir>/<from_id>_<file_name>`, with both parts reduced to a
    /// single path component.
    pub fn output_path(&self, from_id: &str, file_name: &str) -> PathBuf {
        let sender = from_id.replace(['/', '\\'], "_");
        let name = Path::new(file_name)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unnamed");
        self.download_dir.join(format!("{}_{}", sender, name))
    }

    pub fn in_progress(&self) -> usize {
        self.table.in_progress()
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }
}
