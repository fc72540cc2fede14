//! Redb-backed medium.
//!
//! Provides persistent storage using redb with ACID guarantees. Rows are
//! keyed by the encoded `database/container/key` and hold a JSON envelope
//! with the write instant and the record bytes.

use super::keys::{composite_key, composite_prefix, decode_segment};
use super::{Medium, Partition, StoredBlob};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Table holding every partition's rows.
pub(crate) const RECORDS_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("records");

/// Row layout; redb has no per-row timestamp so the write instant is stored here.
#[derive(Serialize, Deserialize)]
struct Row {
    written_at: DateTime<Utc>,
    bytes: Vec<u8>,
}

/// Redb-backed medium.
///
/// Suitable for production use where durability is required.
///
/// # Thread Safety
///
/// `RedbMedium` is `Clone` and can be shared across threads. The underlying
/// database serializes write transactions.
#[derive(Clone)]
pub struct RedbMedium {
    db: Arc<Database>,
}

impl RedbMedium {
    /// Opens or creates a redb database at the given path.
    ///
    /// Creates parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Parent directory cannot be created
    /// - Database file cannot be opened or created (permissions, disk full, etc.)
    /// - Initialization transaction fails to begin or commit
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let db = Database::create(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // Create the table up front so read transactions can always open it
        let write_txn = db
            .begin_write()
            .context("Failed to begin initialization transaction")?;
        {
            let _table = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to initialize records table")?;
        }
        write_txn
            .commit()
            .context("Failed to commit initialization transaction")?;

        Ok(Self { db: Arc::new(db) })
    }

    fn load_sync(&self, row_key: &str) -> Result<Option<StoredBlob>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;

        let table = read_txn
            .open_table(RECORDS_TABLE)
            .context("Failed to open records table")?;

        let Some(guard) = table
            .get(row_key)
            .with_context(|| format!("Failed to read row '{row_key}'"))?
        else {
            return Ok(None);
        };

        let row: Row = serde_json::from_slice(guard.value())
            .with_context(|| format!("Failed to deserialize row '{row_key}'"))?;

        Ok(Some(StoredBlob {
            bytes: row.bytes,
            last_write: row.written_at,
        }))
    }

    fn store_sync(&self, row_key: &str, bytes: Vec<u8>, written_at: DateTime<Utc>) -> Result<()> {
        let json = serde_json::to_vec(&Row { written_at, bytes })
            .context("Failed to serialize row to JSON")?;

        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to open records table")?;

            table
                .insert(row_key, json.as_slice())
                .with_context(|| format!("Failed to insert row '{row_key}'"))?;
        }
        write_txn
            .commit()
            .context("Failed to commit store transaction")?;

        Ok(())
    }

    fn delete_sync(&self, row_key: &str) -> Result<bool> {
        let write_txn = self
            .db
            .begin_write()
            .context("Failed to begin write transaction")?;

        let removed = {
            let mut table = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to open records table")?;

            table
                .remove(row_key)
                .with_context(|| format!("Failed to remove row '{row_key}'"))?
                .is_some()
        };

        write_txn
            .commit()
            .context("Failed to commit delete transaction")?;

        Ok(removed)
    }

    fn list_sync(&self, prefix: &str) -> Result<Vec<String>> {
        let read_txn = self
            .db
            .begin_read()
            .context("Failed to begin read transaction")?;

        let table = read_txn
            .open_table(RECORDS_TABLE)
            .context("Failed to open records table")?;

        // Rows sort by composite key, so a partition's rows are contiguous
        // from its prefix onwards.
        let mut keys = Vec::new();
        let rows = table
            .range::<&str>(prefix..)
            .context("Failed to scan records table")?;
        for item in rows {
            let (row_key, _) = item.context("Failed to read row")?;
            let Some(encoded) = row_key.value().strip_prefix(prefix) else {
                break;
            };
            keys.push(decode_segment(encoded)?);
        }

        Ok(keys)
    }
}

#[async_trait]
impl Medium for RedbMedium {
    fn name(&self) -> &'static str {
        "redb"
    }

    async fn load(&self, partition: &Partition, key: &str) -> Result<Option<StoredBlob>> {
        let medium = self.clone();
        let row_key = composite_key(partition, key)?;
        tokio::task::spawn_blocking(move || medium.load_sync(&row_key))
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
        let row_key = composite_key(partition, key)?;
        tokio::task::spawn_blocking(move || medium.store_sync(&row_key, bytes, written_at))
            .await
            .context("Task join error")??;
        Ok(written_at)
    }

    async fn delete(&self, partition: &Partition, key: &str) -> Result<bool> {
        let medium = self.clone();
        let row_key = composite_key(partition, key)?;
        tokio::task::spawn_blocking(move || medium.delete_sync(&row_key))
            .await
            .context("Task join error")?
    }

    async fn list_keys(&self, partition: &Partition) -> Result<Vec<String>> {
        let medium = self.clone();
        let prefix = composite_prefix(partition)?;
        tokio::task::spawn_blocking(move || medium.list_sync(&prefix))
            .await
            .context("Task join error")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open() -> (TempDir, RedbMedium) {
        let tmp = TempDir::new().unwrap();
        let medium = RedbMedium::open(tmp.path().join("nested").join("state.redb")).unwrap();
        (tmp, medium)
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let (_tmp, medium) = open();
        let partition = Partition::new("db", "c");
        let now = Utc::now();

        medium
            .store(&partition, "key1", b"value1".to_vec(), now)
            .await
            .unwrap();

        let blob = medium.load(&partition, "key1").await.unwrap().unwrap();
        assert_eq!(blob.bytes, b"value1");
        assert_eq!(blob.last_write, now);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_tmp, medium) = open();
        let partition = Partition::new("db", "c");
        medium
            .store(&partition, "k", b"v".to_vec(), Utc::now())
            .await
            .unwrap();

        assert!(medium.delete(&partition, "k").await.unwrap());
        assert!(!medium.delete(&partition, "k").await.unwrap());
        assert!(medium.load(&partition, "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_partition() {
        let (_tmp, medium) = open();
        let sessions = Partition::new("db", "sessions");
        let sessions_archive = Partition::new("db", "sessions-archive");

        for key in ["a/1", "a/2"] {
            medium
                .store(&sessions, key, b"v".to_vec(), Utc::now())
                .await
                .unwrap();
        }
        medium
            .store(&sessions_archive, "old", b"v".to_vec(), Utc::now())
            .await
            .unwrap();

        let mut keys = medium.list_keys(&sessions).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a/1", "a/2"]);
        assert_eq!(medium.list_keys(&sessions_archive).await.unwrap(), vec!["old"]);
    }

    #[tokio::test]
    async fn test_list_stops_at_neighbouring_partitions() {
        let (_tmp, medium) = open();
        let before = Partition::new("da", "x");
        let target = Partition::new("db", "b");
        let after = [Partition::new("db", "c"), Partition::new("dc", "a")];

        medium
            .store(&before, "k", b"v".to_vec(), Utc::now())
            .await
            .unwrap();
        for partition in &after {
            medium
                .store(partition, "k", b"v".to_vec(), Utc::now())
                .await
                .unwrap();
        }
        assert!(medium.list_keys(&target).await.unwrap().is_empty());

        for key in ["z", "a", "m%"] {
            medium
                .store(&target, key, b"v".to_vec(), Utc::now())
                .await
                .unwrap();
        }

        let mut keys = medium.list_keys(&target).await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "m%", "z"]);
        assert_eq!(medium.list_keys(&before).await.unwrap(), vec!["k"]);
        assert_eq!(medium.list_keys(&after[1]).await.unwrap(), vec!["k"]);
    }

    #[tokio::test]
    async fn test_reopen_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.redb");
        let partition = Partition::new("db", "c");
        {
            let medium = RedbMedium::open(&path).unwrap();
            medium
                .store(&partition, "k", b"durable".to_vec(), Utc::now())
                .await
                .unwrap();
        }

        let medium = RedbMedium::open(&path).unwrap();
        let blob = medium.load(&partition, "k").await.unwrap().unwrap();
        assert_eq!(blob.bytes, b"durable");
    }
}
