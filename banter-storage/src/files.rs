//! Attachment blob storage.
//!
//! Metadata lives in the [`ChatStore`](crate::ChatStore); the bytes live
//! behind a [`FileStore`]. The local implementation keeps blobs under a
//! single base directory and never serves a path outside it.

use async_trait::async_trait;
use banter_core::{truncate_chars, BanterError, BanterResult, StorageError};
use chrono::Utc;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::io::AsyncRead;
use uuid::Uuid;

/// Sanitized filenames are capped at this many characters.
pub const MAX_FILENAME_CHARS: usize = 200;

/// Location of a stored blob.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    /// Provider-specific locator, persisted with the attachment metadata and
    /// handed back verbatim for reads and deletes.
    pub storage_path: String,
    /// Stable URI surfaced to ingestion so retrieval hits can cite the file.
    pub uri: String,
    pub size_bytes: i64,
}

/// Blob storage for uploaded attachments.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persist `bytes` under a fresh collision-free path. `owner` is `None`
    /// for system-scoped uploads.
    async fn store(
        &self,
        owner: Option<&str>,
        filename: &str,
        bytes: &[u8],
    ) -> BanterResult<StoredFile>;

    /// Open the blob for streaming reads.
    async fn open_stream(
        &self,
        storage_path: &str,
    ) -> BanterResult<Box<dyn AsyncRead + Send + Unpin>>;

    /// Remove the blob. Deleting a path that is already gone succeeds, so
    /// metadata cleanup can always run the delete.
    async fn delete(&self, storage_path: &str) -> BanterResult<()>;
}

/// Strip a client-supplied filename down to a safe path component.
///
/// Takes the basename (both separator styles), maps whitespace to `_`,
/// drops everything outside `[A-Za-z0-9._+-]`, and caps the length. An
/// input with nothing left becomes `file`.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let safe: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'))
        .collect();
    if safe.is_empty() {
        return "file".to_string();
    }
    truncate_chars(&safe, MAX_FILENAME_CHARS)
}

fn owner_component(owner: Option<&str>) -> String {
    match owner {
        Some(owner) => sanitize_filename(owner),
        None => "_system".to_string(),
    }
}

fn unique_name(filename: &str) -> String {
    let unique: String = Uuid::new_v4().simple().to_string().chars().take(10).collect();
    format!("{}_{}", unique, sanitize_filename(filename))
}

// ============================================================================
// LOCAL FILESYSTEM STORE
// ============================================================================

/// Blobs on the local filesystem, laid out as
/// `<base>/<owner>/<yyyymmddhhmmss>/<unique>_<name>`.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    base_dir: PathBuf,
}

impl LocalFileStore {
    /// Create the base directory if missing and verify it is writable.
    pub async fn new(base_dir: impl Into<PathBuf>) -> BanterResult<Self> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| io_err(&base_dir, &e))?;

        let probe = base_dir.join(".banter-write-probe");
        tokio::fs::write(&probe, b"probe")
            .await
            .map_err(|e| io_err(&probe, &e))?;
        tokio::fs::remove_file(&probe)
            .await
            .map_err(|e| io_err(&probe, &e))?;

        // Canonical base makes the later containment check a plain prefix
        // comparison.
        let base_dir = tokio::fs::canonicalize(&base_dir)
            .await
            .map_err(|e| io_err(&base_dir, &e))?;
        Ok(Self { base_dir })
    }

    /// Reject any path that does not sit inside the base directory.
    fn resolve(&self, storage_path: &str) -> BanterResult<PathBuf> {
        let path = Path::new(storage_path);
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.base_dir) {
            return Err(StorageError::Io {
                path: storage_path.to_string(),
                reason: "path is outside the attachment directory".to_string(),
            }
            .into());
        }
        Ok(path.to_path_buf())
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn store(
        &self,
        owner: Option<&str>,
        filename: &str,
        bytes: &[u8],
    ) -> BanterResult<StoredFile> {
        let path = self
            .base_dir
            .join(owner_component(owner))
            .join(Utc::now().format("%Y%m%d%H%M%S").to_string())
            .join(unique_name(filename));

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, &e))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| io_err(&path, &e))?;

        Ok(StoredFile {
            storage_path: path.display().to_string(),
            uri: format!("file://{}", path.display()),
            size_bytes: bytes.len() as i64,
        })
    }

    async fn open_stream(
        &self,
        storage_path: &str,
    ) -> BanterResult<Box<dyn AsyncRead + Send + Unpin>> {
        let path = self.resolve(storage_path)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| io_err(&path, &e))?;
        Ok(Box::new(file))
    }

    async fn delete(&self, storage_path: &str) -> BanterResult<()> {
        let path = self.resolve(storage_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path, &e)),
        }
    }
}

fn io_err(path: &Path, e: &std::io::Error) -> BanterError {
    StorageError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
    .into()
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Keeps blobs in a shared map. Test double for [`LocalFileStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryFileStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a blob currently exists at `storage_path`.
    pub fn contains(&self, storage_path: &str) -> bool {
        self.blobs
            .read()
            .map(|blobs| blobs.contains_key(storage_path))
            .unwrap_or(false)
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn store(
        &self,
        owner: Option<&str>,
        filename: &str,
        bytes: &[u8],
    ) -> BanterResult<StoredFile> {
        let key = format!("{}/{}", owner_component(owner), unique_name(filename));
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        blobs.insert(key.clone(), bytes.to_vec());
        Ok(StoredFile {
            uri: format!("memory://{}", key),
            storage_path: key,
            size_bytes: bytes.len() as i64,
        })
    }

    async fn open_stream(
        &self,
        storage_path: &str,
    ) -> BanterResult<Box<dyn AsyncRead + Send + Unpin>> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        let bytes = blobs.get(storage_path).cloned().ok_or_else(|| {
            BanterError::from(StorageError::Io {
                path: storage_path.to_string(),
                reason: "no blob at this path".to_string(),
            })
        })?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    async fn delete(&self, storage_path: &str) -> BanterResult<()> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        blobs.remove(storage_path);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
