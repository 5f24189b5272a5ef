use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use fileport_protocol::{DEFAULT_CHUNK_SIZE, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

/// Server configuration.
///
/// Durations are (de)serialized as whole seconds; `null` disables the
/// corresponding timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Address to listen on (port 0 = OS-assigned).
    pub bind_addr: SocketAddr,
    /// Directory holding the stored files.
    pub storage_root: PathBuf,
    /// Maximum number of connections handled at once.
    pub max_connections: usize,
    /// OS accept backlog for connections waiting for a free slot.
    pub backlog: u32,
    /// Close a connection that sends no command for this long.
    #[serde(with = "opt_secs")]
    pub idle_timeout: Option<Duration>,
    /// Abort a transfer when one read or write makes no progress for this long.
    #[serde(with = "opt_secs")]
    pub stall_timeout: Option<Duration>,
    /// Bytes moved per read during a transfer.
    pub chunk_size: usize,
    /// Reject uploads announcing more than this many bytes.
    pub max_upload_bytes: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], DEFAULT_PORT).into(),
            storage_root: PathBuf::from("data"),
            max_connections: 64,
            backlog: 128,
            idle_timeout: Some(Duration::from_secs(300)),
            stall_timeout: Some(Duration::from_secs(60)),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_bytes: None,
        }
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
