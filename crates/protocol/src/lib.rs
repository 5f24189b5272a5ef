//! Wire protocol shared by the fileport server and client.
//!
//! # Wire format
//!
//! ```text
//! COMMAND (Client -> Server):   "GET <name>\n" | "PUT <name>\n" | "NEW <name>\n"
//!
//! GET reply (Server -> Client):
//!   [20 bytes: zero-padded decimal length][length bytes: raw file data]
//!   or "ERROR: <message>\n"
//!
//! PUT/NEW reply (Server -> Client):
//!   "ERROR: <message>\n"                   rejected, no payload expected
//!   "OK\n"                                 accepted, client sends payload:
//!       [20 bytes: length][length bytes]   (Client -> Server)
//!   "OK <64 hex chars>\n"                  stored, SHA-256 of the stored file
//! ```
//!
//! Payloads are always length-prefixed so binary content is never confused
//! with a terminator.

pub mod command;
pub mod digest;
pub mod error;
pub mod frame;
pub mod name;
pub mod status;

pub use command::{Command, decode_command, encode_command};
pub use digest::Digest;
pub use error::ProtocolError;
pub use frame::{
    GetResponse, LENGTH_HEADER_LEN, MAX_COMMAND_LINE, decode_length, encode_length,
    read_command_line, read_get_response, read_length, write_command, write_length,
};
pub use name::FileName;
pub use status::{Status, read_status, write_status};

/// Default TCP port for the fileport service.
pub const DEFAULT_PORT: u16 = 9999;

/// Default transfer chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;
