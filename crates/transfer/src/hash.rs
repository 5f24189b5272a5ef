use std::path::Path;

use fileport_protocol::Digest;
use sha2::{Digest as _, Sha256};
use tokio::io::AsyncReadExt;

use crate::TransferError;

/// Incremental SHA-256 over a byte stream.
#[derive(Clone, Default)]
pub struct StreamHasher {
    inner: Sha256,
    bytes: u64,
}

impl StreamHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finish(self) -> Digest {
        Digest::from_bytes(self.inner.finalize().into())
    }
}

/// Computes the digest of an in-memory buffer.
pub fn digest_bytes(data: &[u8]) -> Digest {
    let mut hasher = StreamHasher::new();
    hasher.update(data);
    hasher.finish()
}

/// Computes the digest of a file, streaming it in 8 KiB reads.
pub async fn digest_file(path: &Path) -> Result<Digest, TransferError> {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TransferError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(TransferError::Storage(e)),
    };

    let mut hasher = StreamHasher::new();
    let mut buf = vec![0u8; 8192];
    loop {
        let n = file.read(&mut buf).await.map_err(TransferError::Storage)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}
