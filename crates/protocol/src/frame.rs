//! Length headers, command lines and the async helpers that move them.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::command::{Command, encode_command};
use crate::error::ProtocolError;
use crate::status::Status;

/// Width of the decimal length header that precedes every payload.
pub const LENGTH_HEADER_LEN: usize = 20;

/// Largest value that fits in the length header (10^20 - 1).
pub const MAX_ENCODABLE_LENGTH: u128 = 99_999_999_999_999_999_999;

/// Longest accepted command or status line, newline included.
pub const MAX_COMMAND_LINE: usize = 1024;

/// First frame of a GET reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResponse {
    /// The file follows: exactly this many bytes.
    Data(u64),
    /// The server refused the request.
    Error(String),
}

/// Encodes `n` as a 20-byte zero-padded decimal header.
pub fn encode_length(n: impl Into<u128>) -> Result<[u8; LENGTH_HEADER_LEN], ProtocolError> {
    let n = n.into();
    if n > MAX_ENCODABLE_LENGTH {
        return Err(ProtocolError::ValueOutOfRange(n));
    }

    let text = format!("{n:0width$}", width = LENGTH_HEADER_LEN);
    let mut header = [0u8; LENGTH_HEADER_LEN];
    header.copy_from_slice(text.as_bytes());
    Ok(header)
}

/// Decodes a 20-byte decimal header.
pub fn decode_length(bytes: &[u8]) -> Result<u64, ProtocolError> {
    if bytes.len() != LENGTH_HEADER_LEN {
        return Err(ProtocolError::MalformedLength(format!(
            "expected {LENGTH_HEADER_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    if !bytes.iter().all(u8::is_ascii_digit) {
        return Err(ProtocolError::MalformedLength(format!(
            "non-digit header: {}",
            String::from_utf8_lossy(bytes).escape_debug()
        )));
    }

    // All digits, so the text is ASCII and at most 10^20 - 1.
    let value: u128 = std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ProtocolError::MalformedLength("unparsable header".into()))?;

    u64::try_from(value).map_err(|_| ProtocolError::ValueOutOfRange(value))
}

/// Writes a command line and flushes.
pub async fn write_command<W: AsyncWrite + Unpin>(
    writer: &mut W,
    cmd: &Command,
) -> Result<(), ProtocolError> {
    writer.write_all(&encode_command(cmd)).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one command line.
///
/// Returns `None` if the peer closed the connection before sending anything.
/// The returned line has its line ending removed.
pub async fn read_command_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<String>, ProtocolError> {
    let Some(raw) = read_line_bounded(reader).await? else {
        return Ok(None);
    };

    String::from_utf8(raw)
        .map(Some)
        .map_err(|_| ProtocolError::MalformedCommand("command is not valid UTF-8".into()))
}

/// Writes a length header (no flush; the payload follows).
pub async fn write_length<W: AsyncWrite + Unpin>(
    writer: &mut W,
    len: u64,
) -> Result<(), ProtocolError> {
    writer.write_all(&encode_length(len)?).await?;
    Ok(())
}

/// Reads and decodes a length header.
pub async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u64, ProtocolError> {
    let mut buf = [0u8; LENGTH_HEADER_LEN];
    reader.read_exact(&mut buf).await.map_err(eof_aware)?;
    decode_length(&buf)
}

/// Reads the first frame of a GET reply.
///
/// Peeks at the first byte: a digit starts a length header, anything else
/// must be an `ERROR:` status line.
pub async fn read_get_response<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<GetResponse, ProtocolError> {
    let first = {
        let buf = reader.fill_buf().await?;
        match buf.first() {
            Some(b) => *b,
            None => return Err(ProtocolError::UnexpectedEof),
        }
    };

    if first.is_ascii_digit() {
        return Ok(GetResponse::Data(read_length(reader).await?));
    }

    match crate::status::read_status(reader).await? {
        Status::Error(message) => Ok(GetResponse::Error(message)),
        other => Err(ProtocolError::MalformedStatus(format!(
            "unexpected reply to GET: {other}"
        ))),
    }
}

/// Reads bytes up to and including `\n`, at most [`MAX_COMMAND_LINE`].
///
/// Returns the line without its ending, or `None` on a clean EOF.
pub(crate) async fn read_line_bounded<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, ProtocolError> {
    let mut buf = Vec::with_capacity(64);
    let n = (&mut *reader)
        .take(MAX_COMMAND_LINE as u64)
        .read_until(b'\n', &mut buf)
        .await?;

    if n == 0 {
        return Ok(None);
    }

    if buf.last() != Some(&b'\n') {
        if buf.len() >= MAX_COMMAND_LINE {
            return Err(ProtocolError::LineTooLong(MAX_COMMAND_LINE));
        }
        return Err(ProtocolError::UnexpectedEof);
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(buf))
}

fn eof_aware(e: std::io::Error) -> ProtocolError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::UnexpectedEof
    } else {
        ProtocolError::Io(e)
    }
}
