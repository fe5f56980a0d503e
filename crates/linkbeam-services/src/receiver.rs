//! Transfer Receiver: writes incoming uploads into the catalog.
//!
//! Bytes go to a uniquely named staging file under `.incoming/`. Only after
//! the body is complete and fsynced is the file linked into the catalog
//! under its final name. Linking fails if the name exists, which makes the
//! rename-on-collision choice atomic across concurrent uploads. An upload
//! that is dropped before `commit` removes its staging file.

use std::io::ErrorKind;
use std::path::PathBuf;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::catalog::{disambiguate, sanitize_filename, FileCatalog, StoredFile};

/// Upper bound on `name_N.ext` candidates tried before giving up.
const MAX_NAME_CANDIDATES: u32 = 10_000;

/// Response body of `POST /api/upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub success: bool,
    /// Final name in the receiver's catalog.
    pub filename: String,
    pub size: u64,
}

impl From<StoredFile> for UploadReceipt {
    fn from(stored: StoredFile) -> Self {
        Self {
            success: true,
            filename: stored.filename,
            size: stored.size,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("upload exceeds {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("no free name left for {0}")]
    NoFreeName(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct FileReceiver {
    catalog: FileCatalog,
    /// None = unlimited.
    max_bytes: Option<u64>,
}

impl FileReceiver {
    /// `max_bytes` of 0 means unlimited.
    pub fn new(catalog: FileCatalog, max_bytes: u64) -> Self {
        Self {
            catalog,
            max_bytes: (max_bytes > 0).then_some(max_bytes),
        }
    }

    pub fn catalog(&self) -> &FileCatalog {
        &self.catalog
    }

    /// Start receiving a file the sender called `original_name`.
    pub async fn begin(&self, original_name: &str) -> Result<IncomingFile, ReceiveError> {
        let name = sanitize_filename(original_name);
        let mut id = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut id);
        let temp_path = self
            .catalog
            .staging_dir()
            .join(format!("{}.part", hex::encode(id)));

        tokio::fs::create_dir_all(self.catalog.staging_dir()).await?;
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;

        tracing::debug!(filename = %name, staging = %temp_path.display(), "upload started");

        Ok(IncomingFile {
            name,
            temp_path,
            file: Some(file),
            written: 0,
            limit: self.max_bytes,
            catalog: self.catalog.clone(),
            committed: false,
        })
    }

    /// Remove staging files left behind by a previous run.
    pub async fn clear_staging(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(self.catalog.staging_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            if tokio::fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "cleared stale partial uploads");
        }
        Ok(removed)
    }
}

/// An upload in progress. Dropping it without `commit` discards it.
#[derive(Debug)]
pub struct IncomingFile {
    name: String,
    temp_path: PathBuf,
    file: Option<tokio::fs::File>,
    written: u64,
    limit: Option<u64>,
    catalog: FileCatalog,
    committed: bool,
}

impl IncomingFile {
    pub async fn write(&mut self, data: &[u8]) -> Result<(), ReceiveError> {
        let next = self.written + data.len() as u64;
        if let Some(limit) = self.limit {
            if next > limit {
                return Err(ReceiveError::TooLarge { limit });
            }
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| std::io::Error::new(ErrorKind::Other, "upload already closed"))?;
        file.write_all(data).await?;
        self.written = next;
        Ok(())
    }

    /// Flush to disk and publish under a free name.
    pub async fn commit(mut self) -> Result<StoredFile, ReceiveError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }

        let final_name = self.link_free_name().await?;
        self.committed = true;
        if let Err(e) = tokio::fs::remove_file(&self.temp_path).await {
            tracing::warn!(error = %e, staging = %self.temp_path.display(), "failed to remove staging file");
        }

        let stored = self
            .catalog
            .stat(&final_name)
            .await
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e.to_string()))?;

        tracing::info!(
            filename = %stored.filename,
            requested = %self.name,
            bytes = stored.size,
            "file received"
        );
        Ok(stored)
    }

    async fn link_free_name(&self) -> Result<String, ReceiveError> {
        for n in 0..MAX_NAME_CANDIDATES {
            let candidate = disambiguate(&self.name, n);
            match tokio::fs::hard_link(&self.temp_path, self.catalog.root().join(&candidate)).await {
                Ok(()) => {
                    if n > 0 {
                        tracing::debug!(requested = %self.name, stored = %candidate, "name collision resolved");
                    }
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ReceiveError::NoFreeName(self.name.clone()))
    }

    /// Explicitly drop a failed upload.
    pub async fn discard(mut self) {
        self.file.take();
        if tokio::fs::remove_file(&self.temp_path).await.is_ok() {
            tracing::info!(filename = %self.name, bytes = self.written, "partial upload discarded");
        }
        self.committed = true;
    }
}

impl Drop for IncomingFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.file.take();
        if std::fs::remove_file(&self.temp_path).is_ok() {
            tracing::info!(filename = %self.name, bytes = self.written, "partial upload discarded");
        }
    }
}
