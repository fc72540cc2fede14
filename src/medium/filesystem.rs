//! Filesystem medium.
//!
//! Layout: `<root>/<database>/<container>/<key>.json`, every segment
//! percent-encoded. The file's native modification time is the record's
//! write timestamp.
//!
//! A segment whose encoded name exceeds
//! [`MAX_FILE_NAME_LEN`](super::MAX_FILE_NAME_LEN) bytes is rejected before
//! touching the disk.

use super::keys::{key_from_file_name, partition_dir, record_file_name};
use super::{Medium, Partition, StoredBlob};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::NamedTempFile;

/// One-file-per-key medium rooted at a directory.
///
/// Writes go to a temporary file in the target directory, which gets the
/// write instant as its mtime and is then renamed over the record file.
/// Readers therefore see either the old or the new record, never a torn one.
///
/// # Thread Safety
///
/// `FilesystemMedium` is `Clone` and can be shared across threads. Blocking
/// I/O runs on tokio's blocking pool. Across processes the only guarantee is
/// the atomicity of the rename.
#[derive(Clone)]
pub struct FilesystemMedium {
    root: Arc<PathBuf>,
}

impl FilesystemMedium {
    /// Opens the medium at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create storage directory: {}", root.display()))?;
        Ok(Self {
            root: Arc::new(root),
        })
    }

    /// Root directory of the medium.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, partition: &Partition, key: &str) -> Result<PathBuf> {
        Ok(partition_dir(&self.root, partition)?.join(record_file_name(key)?))
    }

    fn load_sync(&self, partition: &Partition, key: &str) -> Result<Option<StoredBlob>> {
        let path = self.record_path(partition, key)?;

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read record: {}", path.display()));
            },
        };

        let modified = match fs::metadata(&path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            // Deleted between the read and the stat
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read modification time: {}", path.display())
                });
            },
        };

        Ok(Some(StoredBlob {
            bytes,
            last_write: DateTime::<Utc>::from(modified),
        }))
    }

    fn store_sync(
        &self,
        partition: &Partition,
        key: &str,
        bytes: &[u8],
        written_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let dir = partition_dir(&self.root, partition)?;
        let path = dir.join(record_file_name(key)?);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create partition directory: {}", dir.display()))?;

        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        tmp.write_all(bytes)
            .with_context(|| format!("Failed to write record: {key}"))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("Failed to flush record: {key}"))?;
        tmp.as_file()
            .set_modified(SystemTime::from(written_at))
            .with_context(|| format!("Failed to set modification time: {key}"))?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to replace record file: {}", path.display()))?;

        let modified = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .with_context(|| format!("Failed to read modification time: {}", path.display()))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn delete_sync(&self, partition: &Partition, key: &str) -> Result<bool> {
        let path = self.record_path(partition, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete record: {}", path.display())),
        }
    }

    fn list_sync(&self, partition: &Partition) -> Result<Vec<String>> {
        let dir = partition_dir(&self.root, partition)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to list partition: {}", dir.display()));
            },
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to list partition: {}", dir.display()))?;
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            // Skips in-flight temporary files and anything not written by us
            if let Some(key) = entry.file_name().to_str().and_then(key_from_file_name) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl Medium for FilesystemMedium {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn load(&self, partition: &Partition, key: &str) -> Result<Option<StoredBlob>> {
        let medium = self.clone();
        let partition = partition.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || medium.load_sync(&partition, &key))
            .await
            .context("Task join error")?
    }

    async fn store(
        &self,
        partition: &Partition,
        key: &str,
        bytes: Vec<u8>,
        written_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let medium = self.clone();
        let partition = partition.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || medium.store_sync(&partition, &key, &bytes, written_at))
            .await
            .context("Task join error")?
    }

    async fn delete(&self, partition: &Partition, key: &str) -> Result<bool> {
        let medium = self.clone();
        let partition = partition.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || medium.delete_sync(&partition, &key))
            .await
            .context("Task join error")?
    }

    async fn list_keys(&self, partition: &Partition) -> Result<Vec<String>> {
        let medium = self.clone();
        let partition = partition.clone();
        tokio::task::spawn_blocking(move || medium.list_sync(&partition))
            .await
            .context("Task join error")?
    }
}
