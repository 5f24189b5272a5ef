use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use fileport_protocol::{DEFAULT_CHUNK_SIZE, DEFAULT_PORT};

use crate::error::ClientError;

/// Timeout for establishing the TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a single read or write once connected.
pub const IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Directory downloads land in and uploads are read from.
    pub local_dir: PathBuf,
    pub connect_timeout: Duration,
    /// `None` waits forever on a silent server.
    pub io_timeout: Option<Duration>,
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: ([127, 0, 0, 1], DEFAULT_PORT).into(),
            local_dir: PathBuf::from("downloads"),
            connect_timeout: CONNECT_TIMEOUT,
            io_timeout: Some(IO_TIMEOUT),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ClientConfig {
    /// Resolves `host:port` and keeps the first address returned.
    pub async fn new(
        host: &str,
        port: u16,
        local_dir: impl Into<PathBuf>,
    ) -> Result<Self, ClientError> {
        let addr = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| ClientError::Resolve(format!("{host}:{port}: {e}")))?
            .next()
            .ok_or_else(|| ClientError::Resolve(format!("{host}:{port}: no addresses")))?;

        Ok(Self {
            addr,
            local_dir: local_dir.into(),
            ..Default::default()
        })
    }
}
