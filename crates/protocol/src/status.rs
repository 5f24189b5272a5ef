//! Status lines sent by the server.

use std::fmt;

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};

use crate::digest::Digest;
use crate::error::ProtocolError;
use crate::frame::read_line_bounded;

/// A newline-terminated server status frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// `OK`: upload accepted, the client may send the payload.
    Ready,
    /// `OK <hex>`: upload stored with this digest.
    Stored(Digest),
    /// `ERROR: <message>`: the command was refused.
    Error(String),
}

impl Status {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Renders the frame, newline included.
    pub fn encode(&self) -> String {
        format!("{self}\n")
    }

    /// Parses a status line (line ending optional).
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line == "OK" {
            return Ok(Self::Ready);
        }
        if let Some(hex) = line.strip_prefix("OK ") {
            return Ok(Self::Stored(hex.trim().parse()?));
        }
        if let Some(message) = line
            .strip_prefix("ERROR:")
            .or_else(|| line.strip_prefix("ERROR "))
        {
            return Ok(Self::Error(message.trim().to_string()));
        }
        if line == "ERROR" {
            return Ok(Self::Error(String::new()));
        }

        Err(ProtocolError::MalformedStatus(line.escape_debug().to_string()))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => f.write_str("OK"),
            Self::Stored(digest) => write!(f, "OK {digest}"),
            // Messages must stay on one line.
            Self::Error(message) => {
                let message: String = message
                    .chars()
                    .map(|c| if c.is_control() { ' ' } else { c })
                    .collect();
                write!(f, "ERROR: {message}")
            }
        }
    }
}

/// Writes a status frame and flushes.
pub async fn write_status<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: &Status,
) -> Result<(), ProtocolError> {
    writer.write_all(status.encode().as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one status frame.
pub async fn read_status<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Status, ProtocolError> {
    let raw = read_line_bounded(reader)
        .await?
        .ok_or(ProtocolError::UnexpectedEof)?;
    let line = String::from_utf8(raw)
        .map_err(|_| ProtocolError::MalformedStatus("status is not valid UTF-8".into()))?;
    Status::decode(&line)
}
