//! fileport server.
//!
//! Listens on a TCP port, hands every accepted connection to its own
//! [`ConnectionHandler`] task, and caps the number of handlers running at
//! once. Connections above the cap wait in the OS accept backlog.

mod config;
mod handler;
mod server;

pub use config::ServerConfig;
pub use handler::{ConnectionHandler, SessionStats};
pub use server::FileServer;

use std::time::Duration;

use fileport_protocol::ProtocolError;
use fileport_transfer::TransferError;

/// Pause after a failed `accept()` before trying again.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Reply text for a missing file.
pub const MSG_NOT_FOUND: &str = "not found";

/// Reply text for a NEW whose target is already stored.
pub const MSG_ALREADY_EXISTS: &str = "already exists";

/// Reply text for an upload above the configured limit.
pub const MSG_TOO_LARGE: &str = "too large";

/// Errors produced by the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}
