/// Chunk layout for transfers carried inside `file_chunk` envelopes.
///
/// A transfer is one `file_announce` followed by `file_chunk` frames with
/// `seq` counting from 0. Every data chunk holds exactly `CHUNK_SIZE` bytes
/// except possibly the last one. The transfer ends with a chunk whose
/// `is_last` flag is set; the sender always makes that one empty.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use courier_types::{FileAnnouncement, FileChunk};

/// Plaintext bytes per chunk (1 KB).
pub const CHUNK_SIZE: usize = 1024;

/// Encode chunk bytes for the `data_b64` field.
pub fn encode_chunk_data(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a `data_b64` field back into bytes.
pub fn decode_chunk_data(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}

/// Identifies one in-flight transfer on the receiving side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferKey {
    pub from_id: String,
    pub file_name: String,
}

impl TransferKey {
    pub fn new(from_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            from_id: from_id.into(),
            file_name: file_name.into(),
        }
    }

    pub fn of_announcement(announce: &FileAnnouncement) -> Self {
        Self::new(announce.from_id.clone(), announce.name.clone())
    }

    pub fn of_chunk(chunk: &FileChunk) -> Self {
        Self::new(chunk.from_id.clone(), chunk.file_name.clone())
    }
}

impl std::fmt::Display for TransferKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.from_id, self.file_name)
    }
}
