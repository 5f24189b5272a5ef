//! Command lines sent by the client.

use std::fmt;

use crate::error::ProtocolError;
use crate::name::FileName;

/// A client request. One command is read per exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Download a stored file.
    Get(FileName),
    /// Overwrite a file that already exists in the store.
    Put(FileName),
    /// Store a file that must not exist yet.
    New(FileName),
}

impl Command {
    /// The verb as it appears on the wire.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Get(_) => "GET",
            Self::Put(_) => "PUT",
            Self::New(_) => "NEW",
        }
    }

    pub fn name(&self) -> &FileName {
        match self {
            Self::Get(name) | Self::Put(name) | Self::New(name) => name,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb(), self.name())
    }
}

/// Renders a command as a newline-terminated line.
///
/// The name was validated when the [`FileName`] was built, so encoding
/// cannot fail.
pub fn encode_command(cmd: &Command) -> Vec<u8> {
    format!("{cmd}\n").into_bytes()
}

/// Parses one command line (with or without its trailing newline).
///
/// `UPDATE` is accepted as a legacy spelling of `PUT`.
pub fn decode_command(line: &str) -> Result<Command, ProtocolError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    let (verb, rest) = match line.split_once(|c: char| c.is_ascii_whitespace()) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line.trim(), ""),
    };

    if verb.is_empty() {
        return Err(ProtocolError::MalformedCommand("empty command".into()));
    }

    let make: fn(FileName) -> Command = match verb {
        "GET" => Command::Get,
        "PUT" | "UPDATE" => Command::Put,
        "NEW" => Command::New,
        other => {
            return Err(ProtocolError::MalformedCommand(format!(
                "unknown verb: {}",
                other.escape_debug()
            )));
        }
    };

    if rest.is_empty() {
        return Err(ProtocolError::MalformedCommand(format!(
            "missing filename after {verb}"
        )));
    }

    Ok(make(FileName::new(rest)?))
}
