/// Outbound side of a transfer: source bytes → envelopes.
///
/// ```text
/// file_announce { size, chunk_size }
/// file_chunk    { seq: 0, data, is_last: false }
/// ...
/// file_chunk    { seq: n, data: "", is_last: true }
/// ```

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

use courier_types::{Envelope, FileAnnouncement, FileChunk};

use crate::logging::{TracingLogger, TransferEvent, TransferLog, TransferLogger};
use crate::protocol::{CHUNK_SIZE, TransferKey, encode_chunk_data};

/// Turns a byte source into a run of `file_chunk` envelopes.
pub struct FileSender<R> {
    reader: R,
    key: TransferKey,
    to_id: Option<String>,
    chunk_size: usize,
    buf: Vec<u8>,
    next_seq: u64,
    bytes_sent: u64,
    finished: bool,
    logger: Arc<dyn TransferLogger>,
}

impl<R: AsyncRead + Unpin> FileSender<R> {
    /// `to_id` of `None` (or an empty string) addresses every other client.
    pub fn new(
        reader: R,
        from_id: impl Into<String>,
        to_id: Option<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            reader,
            key: TransferKey::new(from_id, file_name),
            to_id: to_id.filter(|id| !id.is_empty()),
            chunk_size: CHUNK_SIZE,
            buf: vec![0u8; CHUNK_SIZE],
            next_seq: 0,
            bytes_sent: 0,
            finished: false,
            logger: Arc::new(TracingLogger),
        }
    }

    /// Override the chunk size. Zero is treated as one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self.buf = vec![0u8; self.chunk_size];
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn TransferLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// The announcement that must precede the chunks.
    pub fn announcement(&self, size: u64) -> Envelope {
        Envelope::FileAnnounce(FileAnnouncement {
            from_id: self.key.from_id.clone(),
            to_id: self.to_id.clone(),
            name: self.key.file_name.clone(),
            size,
            chunk_size: self.chunk_size as u64,
        })
    }

    /// Produce the next chunk, or `None` once the terminal chunk was produced.
    pub async fn next_chunk(&mut self) -> io::Result<Option<Envelope>> {
        if self.finished {
            return Ok(None);
        }

        let filled = self.fill_buf().await?;
        let seq = self.next_seq;
        self.next_seq += 1;

        if filled == 0 {
            self.finished = true;
            self.log(TransferEvent::SendComplete {
                total_bytes: self.bytes_sent,
                chunks: self.next_seq,
            });
            return Ok(Some(self.chunk(seq, String::new(), true)));
        }

        self.bytes_sent += filled as u64;
        self.log(TransferEvent::ChunkSent { seq, size: filled });
        let data = encode_chunk_data(&self.buf[..filled]);
        Ok(Some(self.chunk(seq, data, false)))
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read until the buffer is full or the source is exhausted.
    async fn fill_buf(&mut self) -> io::Result<usize> {
        let mut filled = 0;
        while filled < self.chunk_size {
            let n = self.reader.read(&mut self.buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn chunk(&self, seq: u64, data_b64: String, is_last: bool) -> Envelope {
        Envelope::FileChunk(FileChunk {
            from_id: self.key.from_id.clone(),
            to_id: self.to_id.clone(),
            file_name: self.key.file_name.clone(),
            seq,
            data_b64,
            is_last,
        })
    }

    fn log(&self, event: TransferEvent) {
        self.logger.log(TransferLog {
            component: "sender",
            key: self.key.clone(),
            event,
        });
    }
}

/// Open a file on disk for sending. The announced name is the final path
/// component and the announced size comes from the file's metadata.
pub async fn open_file(
    path: &Path,
    from_id: &str,
    to_id: Option<String>,
) -> Result<(Envelope, FileSender<tokio::fs::File>)> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?
        .to_string();

    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let size = file.metadata().await?.len();

    let sender = FileSender::new(file, from_id, to_id, file_name);
    let announcement = sender.announcement(size);
    Ok((announcement, sender))
}
