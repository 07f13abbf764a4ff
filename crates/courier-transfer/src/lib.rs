/// Courier file transfers: chunked `file_chunk` envelopes over the shared
/// JSON frame stream.
///
/// - Sender: announcement, fixed-size base64 chunks, empty terminal chunk
/// - Receiver: per-(sender, file name) reassembly, stale transfers replaced
/// - Storage: pluggable sink for finished files (disk or memory)
/// - Structured transfer logging

pub mod logging;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod storage;

pub use logging::{NullLogger, TracingLogger, TransferLogger};
pub use protocol::{CHUNK_SIZE, TransferKey, decode_chunk_data, encode_chunk_data};
pub use receiver::{CompletedTransfer, FileReceiver, ReceivedFile, TransferError, TransferTable};
pub use sender::{FileSender, open_file};
pub use storage::{DiskStorage, FileStorage, MemoryStorage};
