//! Error types for the client.

use std::path::PathBuf;

use fileport_protocol::{Digest, ProtocolError};
use fileport_transfer::TransferError;

/// Broad origin of a client failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The server answered with `ERROR:`.
    Rejected,
    /// Something on this machine was wrong before or outside the exchange.
    LocalPrecondition,
    /// The connection failed, timed out or closed early.
    Network,
    /// The server sent something that does not follow the protocol.
    Protocol,
    /// The stored file does not hash to what was sent.
    Integrity,
}

/// Errors produced by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("local file not found: {}", .0.display())]
    LocalFileNotFound(PathBuf),

    #[error("invalid name: {0}")]
    InvalidName(#[source] ProtocolError),

    #[error("server rejected request: {0}")]
    Rejected(String),

    #[error("digest mismatch: sent {local}, server stored {remote}")]
    DigestMismatch { local: Digest, remote: Digest },

    #[error("timed out while {0}")]
    Timeout(&'static str),

    #[error("cannot resolve {0}")]
    Resolve(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rejected(_) => ErrorKind::Rejected,
            Self::LocalFileNotFound(_) | Self::InvalidName(_) => ErrorKind::LocalPrecondition,
            Self::DigestMismatch { .. } => ErrorKind::Integrity,
            Self::Timeout(_) | Self::Resolve(_) | Self::Io(_) => ErrorKind::Network,
            Self::Protocol(e) => protocol_kind(e),
            Self::Transfer(e) => match e {
                TransferError::FileNotFound(_)
                | TransferError::Storage(_)
                | TransferError::SourceFailed(_)
                | TransferError::SourceTruncated { .. } => ErrorKind::LocalPrecondition,
                TransferError::Io(_) | TransferError::ShortRead { .. } | TransferError::Stalled(_) => {
                    ErrorKind::Network
                }
                TransferError::Protocol(e) => protocol_kind(e),
            },
        }
    }
}

fn protocol_kind(e: &ProtocolError) -> ErrorKind {
    match e {
        ProtocolError::Io(_) | ProtocolError::UnexpectedEof => ErrorKind::Network,
        _ => ErrorKind::Protocol,
    }
}
