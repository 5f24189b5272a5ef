//! Streaming file transfer over an open connection.
//!
//! [`TransferEngine::send_file`] writes a length header followed by the file
//! contents; [`TransferEngine::receive_file`] reads exactly the announced
//! number of bytes into an [`AtomicFile`] and renames it into place. Both
//! hash the bytes as they pass so the two peers can compare digests.

mod atomic;
mod engine;
mod hash;

use std::path::PathBuf;
use std::time::Duration;

use fileport_protocol::ProtocolError;

pub use atomic::AtomicFile;
pub use engine::{TransferEngine, TransferOutcome};
pub use hash::{StreamHasher, digest_bytes, digest_file};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Connection-level failure (reset, broken pipe).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local filesystem failure while opening or writing a file.
    #[error("storage error: {0}")]
    Storage(#[source] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("connection closed after {received} of {expected} bytes")]
    ShortRead { expected: u64, received: u64 },

    #[error("source shrank while sending: {sent} of {expected} bytes")]
    SourceTruncated { expected: u64, sent: u64 },

    #[error("source read failed mid-transfer: {0}")]
    SourceFailed(#[source] std::io::Error),

    #[error("no progress for {0:?}")]
    Stalled(Duration),
}
