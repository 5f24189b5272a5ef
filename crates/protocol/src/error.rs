//! Error types for the wire protocol.

/// Errors produced while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("malformed length header: {0}")]
    MalformedLength(String),

    #[error("value out of range: {0}")]
    ValueOutOfRange(u128),

    #[error("malformed status line: {0}")]
    MalformedStatus(String),

    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("connection closed mid-frame")]
    UnexpectedEof,
}

impl ProtocolError {
    /// Returns `true` for errors that only concern the offending command.
    ///
    /// The stream is still framed correctly afterwards, so a server can
    /// report the error and keep reading commands.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedCommand(_) | Self::InvalidName(_))
    }
}
