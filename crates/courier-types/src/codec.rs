//! Newline-delimited JSON framing.
//!
//! Every frame is one compact JSON object followed by `\n`. Compact JSON
//! escapes newlines inside strings, so the delimiter can never appear inside a
//! frame and no length prefix is needed. Binary data must already be base64
//! inside the envelope; nothing else may be read from or written to a framed
//! stream.

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::envelope::Envelope;

/// Default upper bound for one frame, delimiter included.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const DELIMITER: u8 = b'\n';

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("stream ended mid-frame")]
    Truncated,
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Encode one envelope as a complete frame, delimiter included.
pub fn encode(envelope: &Envelope) -> Result<Bytes, FrameError> {
    let mut buf = serde_json::to_vec(envelope)?;
    buf.push(DELIMITER);
    Ok(Bytes::from(buf))
}

/// Decode a single frame body. Trailing whitespace (the delimiter, or a
/// `\r\n` line ending) is ignored.
pub fn decode(frame: &[u8]) -> Result<Envelope, FrameError> {
    Ok(serde_json::from_slice(frame.trim_ascii_end())?)
}

/// A decoded envelope together with the exact bytes it arrived as.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub envelope: Envelope,
    pub raw: Bytes,
}

/// Reads successive frames from a byte stream.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_frame_size(reader, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(reader: R, max_frame_size: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            buf: Vec::new(),
            max_frame_size,
        }
    }

    /// Wait for the next frame.
    ///
    /// Returns `Ok(None)` when the peer closes the stream on a frame boundary.
    /// Blank lines between frames are skipped.
    pub async fn next_frame(&mut self) -> Result<Option<InboundFrame>, FrameError> {
        loop {
            self.buf.clear();
            let limit = self.max_frame_size as u64;
            let n = (&mut self.inner)
                .take(limit)
                .read_until(DELIMITER, &mut self.buf)
                .await?;

            if n == 0 {
                return Ok(None);
            }

            if self.buf.last() != Some(&DELIMITER) {
                if n as u64 >= limit {
                    return Err(FrameError::TooLarge {
                        limit: self.max_frame_size,
                    });
                }
                return Err(FrameError::Truncated);
            }

            if self.buf.trim_ascii().is_empty() {
                continue;
            }

            let envelope = decode(&self.buf)?;
            return Ok(Some(InboundFrame {
                envelope,
                raw: Bytes::copy_from_slice(&self.buf),
            }));
        }
    }

    pub async fn next_envelope(&mut self) -> Result<Option<Envelope>, FrameError> {
        Ok(self.next_frame().await?.map(|frame| frame.envelope))
    }
}

/// Writes whole frames to a byte stream.
///
/// Not synchronized: callers that share a stream must serialize access
/// (the gateway gives each connection a single writer task).
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), FrameError> {
        let frame = encode(envelope)?;
        self.send_raw(&frame).await
    }

    /// Write an already-encoded frame verbatim.
    pub async fn send_raw(&mut self, frame: &[u8]) -> Result<(), FrameError> {
        self.inner.write_all(frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.inner.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{ChatMessage, FileAnnouncement, FileChunk};
    use crate::models::ClientIdentity;

    fn samples() -> Vec<Envelope> {
        vec![
            Envelope::Registration(ClientIdentity::new("client_ann_1", "ann")),
            Envelope::Chat(ChatMessage::broadcast("client_ann_1", "hello\nworld \"quoted\"")),
            Envelope::Chat(ChatMessage::direct("client_ann_1", "client_bob_2", "psst")),
            Envelope::FileAnnounce(FileAnnouncement {
                from_id: "client_ann_1".into(),
                to_id: None,
                name: "notes.txt".into(),
                size: 10,
                chunk_size: 4,
            }),
            Envelope::FileChunk(FileChunk {
                from_id: "client_ann_1".into(),
                to_id: Some("client_bob_2".into()),
                file_name: "notes.txt".into(),
                seq: 3,
                data_b64: "AAEC/w==".into(),
                is_last: true,
            }),
        ]
    }

    #[tokio::test]
    async fn stream_roundtrip_preserves_every_kind() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut writer = FrameWriter::new(client);
        for envelope in samples() {
            writer.send(&envelope).await.unwrap();
        }
        drop(writer);

        let mut reader = FrameReader::new(server);
        let mut decoded = Vec::new();
        while let Some(envelope) = reader.next_envelope().await.unwrap() {
            decoded.push(envelope);
        }
        assert_eq!(decoded, samples());
    }

    #[test]
    fn encoded_frame_is_single_line() {
        let frame = encode(&samples()[1]).unwrap();
        assert_eq!(frame.iter().filter(|b| **b == b'\n').count(), 1);
        assert_eq!(frame.last(), Some(&b'\n'));
    }

    #[tokio::test]
    async fn raw_bytes_match_what_was_sent() {
        let frame = encode(&samples()[4]).unwrap();
        let mut reader = FrameReader::new(&frame[..]);
        let inbound = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(inbound.raw, frame);
        assert_eq!(inbound.envelope, samples()[4]);
    }

    #[tokio::test]
    async fn blank_lines_and_crlf_are_tolerated() {
        let input = b"\n\r\n{\"type\":\"registration\",\"registration\":{\"id\":\"x\",\"name\":\"y\"}}\r\n";
        let mut reader = FrameReader::new(&input[..]);
        let envelope = reader.next_envelope().await.unwrap().unwrap();
        assert_eq!(envelope, Envelope::Registration(ClientIdentity::new("x", "y")));
        assert!(reader.next_envelope().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_mid_frame_is_truncated() {
        let input = b"{\"type\":\"chat\"";
        let mut reader = FrameReader::new(&input[..]);
        assert!(matches!(reader.next_frame().await, Err(FrameError::Truncated)));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let frame = encode(&samples()[1]).unwrap();
        let mut reader = FrameReader::with_max_frame_size(&frame[..], 8);
        assert!(matches!(
            reader.next_frame().await,
            Err(FrameError::TooLarge { limit: 8 })
        ));
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let input = b"not json\n";
        let mut reader = FrameReader::new(&input[..]);
        assert!(matches!(reader.next_frame().await, Err(FrameError::Malformed(_))));
    }
}
