//! Write-then-rename file replacement.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::TransferError;

/// A file that only appears under its final name once fully written.
///
/// Data goes to a uniquely named sibling (`.<name>.<uuid>.part`). [`commit`]
/// syncs it and renames it over the destination. If the value is dropped
/// without committing, the temporary file is removed and the destination is
/// left untouched.
///
/// [`commit`]: AtomicFile::commit
pub struct AtomicFile {
    final_path: PathBuf,
    temp_path: PathBuf,
    file: Option<fs::File>,
    bytes_written: u64,
}

impl AtomicFile {
    /// Creates the temporary file next to `path`.
    pub async fn create(path: &Path) -> Result<Self, TransferError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                TransferError::Storage(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("destination has no file name: {}", path.display()),
                ))
            })?;
        let temp_path = path.with_file_name(format!(
            ".{file_name}.{}.part",
            uuid::Uuid::new_v4().simple()
        ));

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await
            .map_err(TransferError::Storage)?;

        debug!(temp = %temp_path.display(), "temporary file created");

        Ok(Self {
            final_path: path.to_path_buf(),
            temp_path,
            file: Some(file),
            bytes_written: 0,
        })
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), TransferError> {
        let file = self.file.as_mut().ok_or_else(finalized)?;
        file.write_all(data).await.map_err(TransferError::Storage)?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Flushes, syncs and renames the temporary file over the destination.
    pub async fn commit(mut self) -> Result<PathBuf, TransferError> {
        let mut file = self.file.take().ok_or_else(finalized)?;
        file.flush().await.map_err(TransferError::Storage)?;
        file.sync_all().await.map_err(TransferError::Storage)?;
        drop(file);

        fs::rename(&self.temp_path, &self.final_path)
            .await
            .map_err(TransferError::Storage)?;

        debug!(
            path = %self.final_path.display(),
            bytes = self.bytes_written,
            "atomic write committed"
        );

        // Renamed away; nothing left for Drop to clean up.
        self.temp_path = PathBuf::new();
        Ok(std::mem::take(&mut self.final_path))
    }

    /// Discards the temporary file.
    pub async fn abort(mut self) {
        drop(self.file.take());
        if let Err(e) = fs::remove_file(&self.temp_path).await {
            warn!(temp = %self.temp_path.display(), "failed to remove temporary file: {e}");
        }
        self.temp_path = PathBuf::new();
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        drop(self.file.take());
        if !self.temp_path.as_os_str().is_empty() {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

fn finalized() -> TransferError {
    TransferError::Storage(std::io::Error::other("atomic file already finalized"))
}
