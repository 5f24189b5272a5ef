use std::future::Future;
use std::path::Path;
use std::time::Duration;

use fileport_protocol::{DEFAULT_CHUNK_SIZE, Digest, encode_length, read_length};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::TransferError;
use crate::atomic::AtomicFile;
use crate::hash::StreamHasher;

/// Result of a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    pub digest: Digest,
    pub bytes: u64,
}

/// Bytes expected vs. moved so far, plus the running hash.
struct Transfer {
    expected: u64,
    done: u64,
    hasher: StreamHasher,
}

impl Transfer {
    fn new(expected: u64) -> Self {
        Self {
            expected,
            done: 0,
            hasher: StreamHasher::new(),
        }
    }

    fn remaining(&self) -> u64 {
        self.expected - self.done
    }

    fn record(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.done += chunk.len() as u64;
    }

    fn finish(self) -> TransferOutcome {
        TransferOutcome {
            digest: self.hasher.finish(),
            bytes: self.done,
        }
    }
}

/// Drives one file transfer at a time over a caller-owned connection.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    chunk_size: usize,
    stall_timeout: Option<Duration>,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            stall_timeout: None,
        }
    }
}

impl TransferEngine {
    /// Creates an engine moving `chunk_size` bytes per read.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: if chunk_size == 0 {
                DEFAULT_CHUNK_SIZE
            } else {
                chunk_size
            },
            stall_timeout: None,
        }
    }

    /// Fails a transfer when a single connection read or write takes
    /// longer than `timeout`.
    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// Reads the length header that precedes an incoming payload.
    ///
    /// Bounded by the stall timeout like every other read of a transfer.
    pub async fn read_header<R: AsyncRead + Unpin>(
        &self,
        conn: &mut R,
    ) -> Result<u64, TransferError> {
        match self.stall_timeout {
            Some(limit) => tokio::time::timeout(limit, read_length(conn))
                .await
                .map_err(|_| TransferError::Stalled(limit))?
                .map_err(TransferError::Protocol),
            None => Ok(read_length(conn).await?),
        }
    }

    /// Sends `path` as a length header followed by its contents.
    ///
    /// [`TransferError::FileNotFound`] and [`TransferError::Storage`] are
    /// only returned before anything has been written to `conn`.
    pub async fn send_file<W: AsyncWrite + Unpin>(
        &self,
        conn: &mut W,
        path: &Path,
    ) -> Result<TransferOutcome, TransferError> {
        let mut file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(TransferError::Storage(e)),
        };
        let metadata = file.metadata().await.map_err(TransferError::Storage)?;
        if !metadata.is_file() {
            return Err(TransferError::FileNotFound(path.to_path_buf()));
        }

        let mut transfer = Transfer::new(metadata.len());
        let header = encode_length(transfer.expected)?;
        self.guard(conn.write_all(&header)).await?;

        let mut buf = vec![0u8; self.chunk_size];
        while transfer.remaining() > 0 {
            let to_read = transfer.remaining().min(buf.len() as u64) as usize;
            let n = file
                .read(&mut buf[..to_read])
                .await
                .map_err(TransferError::SourceFailed)?;
            if n == 0 {
                return Err(TransferError::SourceTruncated {
                    expected: transfer.expected,
                    sent: transfer.done,
                });
            }

            self.guard(conn.write_all(&buf[..n])).await?;
            transfer.record(&buf[..n]);
        }

        self.guard(conn.flush()).await?;

        let outcome = transfer.finish();
        debug!(
            path = %path.display(),
            bytes = outcome.bytes,
            digest = %outcome.digest,
            "file sent"
        );
        Ok(outcome)
    }

    /// Receives exactly `expected_len` bytes into `path`.
    ///
    /// The data lands in a temporary sibling that replaces `path` only after
    /// every byte arrived. On any error the temporary file is removed and
    /// `path` keeps its previous state.
    pub async fn receive_file<R: AsyncRead + Unpin>(
        &self,
        conn: &mut R,
        path: &Path,
        expected_len: u64,
    ) -> Result<TransferOutcome, TransferError> {
        let mut file = AtomicFile::create(path).await?;

        match self.pump(conn, &mut file, expected_len).await {
            Ok(outcome) => {
                file.commit().await?;
                debug!(
                    path = %path.display(),
                    bytes = outcome.bytes,
                    digest = %outcome.digest,
                    "file received"
                );
                Ok(outcome)
            }
            Err(e) => {
                file.abort().await;
                Err(e)
            }
        }
    }

    async fn pump<R: AsyncRead + Unpin>(
        &self,
        conn: &mut R,
        file: &mut AtomicFile,
        expected_len: u64,
    ) -> Result<TransferOutcome, TransferError> {
        let mut transfer = Transfer::new(expected_len);
        let mut buf = vec![0u8; self.chunk_size];

        while transfer.remaining() > 0 {
            let to_read = transfer.remaining().min(buf.len() as u64) as usize;
            let n = self.guard(conn.read(&mut buf[..to_read])).await?;
            if n == 0 {
                return Err(TransferError::ShortRead {
                    expected: transfer.expected,
                    received: transfer.done,
                });
            }

            file.write_all(&buf[..n]).await?;
            transfer.record(&buf[..n]);
        }

        Ok(transfer.finish())
    }

    /// Applies the stall timeout to one connection operation.
    async fn guard<T, F>(&self, op: F) -> Result<T, TransferError>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        match self.stall_timeout {
            Some(limit) => tokio::time::timeout(limit, op)
                .await
                .map_err(|_| TransferError::Stalled(limit))?
                .map_err(TransferError::Io),
            None => op.await.map_err(TransferError::Io),
        }
    }
}
