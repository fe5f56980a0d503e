//! File Catalog: the files this node has durably received.
//!
//! The catalog is the received directory itself: every regular, non-hidden
//! file directly inside it is an entry. In-flight uploads are staged in
//! `.incoming/` and so never show up here.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use linkbeam_core::peer::unix_secs;

/// Staging subdirectory for uploads that have not finished yet.
pub const STAGING_DIR: &str = ".incoming";

/// Name used when an upload's name sanitises to nothing.
pub const FALLBACK_FILENAME: &str = "uploaded_file";

/// Longest file name, in bytes, common filesystems accept.
pub const MAX_FILENAME_BYTES: usize = 255;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub filename: String,
    pub size: u64,
    /// Write completion time.
    #[serde(with = "unix_secs")]
    pub modified: SystemTime,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct FileCatalog {
    root: PathBuf,
}

impl FileCatalog {
    /// Open (creating if needed) the catalog rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Every stored file, in directory order.
    pub async fn list(&self) -> Result<Vec<StoredFile>, CatalogError> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_catalog_name(&name) {
                continue;
            }
            // A file can vanish between read_dir and stat; skip it.
            let Ok(meta) = tokio::fs::metadata(entry.path()).await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            files.push(StoredFile {
                filename: name,
                size: meta.len(),
                modified: meta.modified()?,
            });
        }

        Ok(files)
    }

    pub async fn stat(&self, filename: &str) -> Result<StoredFile, CatalogError> {
        let path = self.resolve(filename)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| not_found_or_io(e, filename))?;
        if !meta.is_file() {
            return Err(CatalogError::NotFound(filename.to_string()));
        }
        Ok(StoredFile {
            filename: filename.to_string(),
            size: meta.len(),
            modified: meta.modified()?,
        })
    }

    /// Open a stored file for streaming back to a requester.
    pub async fn fetch(
        &self,
        filename: &str,
    ) -> Result<(tokio::fs::File, StoredFile), CatalogError> {
        let stored = self.stat(filename).await?;
        let file = tokio::fs::File::open(self.root.join(&stored.filename))
            .await
            .map_err(|e| not_found_or_io(e, filename))?;
        Ok((file, stored))
    }

    /// Map a requested name to a path inside the root.
    fn resolve(&self, filename: &str) -> Result<PathBuf, CatalogError> {
        if !is_catalog_name(filename) {
            return Err(CatalogError::NotFound(filename.to_string()));
        }
        Ok(self.root.join(filename))
    }
}

/// A single visible entry directly under the root. `list` and `fetch` both
/// go through this, so every listed name can be fetched.
fn is_catalog_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}

fn not_found_or_io(e: std::io::Error, filename: &str) -> CatalogError {
    if e.kind() == ErrorKind::NotFound {
        CatalogError::NotFound(filename.to_string())
    } else {
        CatalogError::Io(e)
    }
}

/// Reduce an uploaded name to something safe to store: the last path
/// component, no leading dots, ASCII `[A-Za-z0-9._-]` only, at most
/// [`MAX_FILENAME_BYTES`] long.
pub fn sanitize_filename(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw);

    let clean: String = last
        .trim_start_matches('.')
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();

    if clean.is_empty() {
        return FALLBACK_FILENAME.to_string();
    }
    disambiguate(&clean, 0)
}

/// The `n`th candidate name for `name`: `report.pdf`, `report_1.pdf`,
/// `report_2.pdf` and so on. The stem is shortened so the candidate never
/// exceeds [`MAX_FILENAME_BYTES`].
pub fn disambiguate(name: &str, n: u32) -> String {
    let suffix = if n == 0 { String::new() } else { format!("_{n}") };
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot + suffix.len() < MAX_FILENAME_BYTES => {
            name.split_at(dot)
        }
        _ => (name, ""),
    };
    let budget = MAX_FILENAME_BYTES - suffix.len() - ext.len();
    format!("{}{suffix}{ext}", truncate_on_char(stem, budget))
}

fn truncate_on_char(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
