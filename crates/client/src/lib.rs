//! fileport client.
//!
//! Every operation opens its own connection, performs one exchange with the
//! server and closes the connection again.

mod client;
mod config;
mod error;

pub use client::FileClient;
pub use config::{CONNECT_TIMEOUT, ClientConfig, IO_TIMEOUT};
pub use error::{ClientError, ErrorKind};

/// Buffer size for the connection halves.
pub const TCP_BUFFER_SIZE: usize = 64 * 1024;
