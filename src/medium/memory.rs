//! In-memory medium.
//!
//! Provides fast, non-persistent storage using DashMap for concurrent
//! access. Ideal for testing, development, and embedded use cases.

use super::{Medium, Partition, StoredBlob};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Entry stored in a partition table; the write instant is kept alongside
/// the bytes because memory has no native timestamp.
#[derive(Clone)]
struct MemoryEntry {
    bytes: Vec<u8>,
    written_at: DateTime<Utc>,
}

type PartitionTable = DashMap<String, MemoryEntry>;

/// Process-local medium using one DashMap per partition.
///
/// Clones share the same tables: every store opened on a clone of the same
/// `MemoryMedium` sees the same partitions. Separate `MemoryMedium::new()`
/// instances are fully isolated, which keeps parallel tests independent.
/// All data is lost when the last clone is dropped.
///
/// # Example
///
/// ```
/// use kvstate::{MemoryMedium, Storage};
///
/// let medium = MemoryMedium::new();
/// let storage = Storage::builder(medium.clone()).build();
/// ```
#[derive(Clone, Default)]
pub struct MemoryMedium {
    partitions: Arc<DashMap<Partition, Arc<PartitionTable>>>,
}

impl MemoryMedium {
    /// Creates a new, empty registry of partitions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a partition, including expired ones not yet reclaimed.
    pub fn len(&self, partition: &Partition) -> usize {
        self.partitions
            .get(partition)
            .map_or(0, |table| table.len())
    }

    /// Returns true if the partition holds no entries.
    pub fn is_empty(&self, partition: &Partition) -> bool {
        self.len(partition) == 0
    }

    /// Drops every partition.
    pub fn clear(&self) {
        self.partitions.clear();
    }

    fn table(&self, partition: &Partition) -> Option<Arc<PartitionTable>> {
        self.partitions
            .get(partition)
            .map(|table| Arc::clone(table.value()))
    }
}

#[async_trait]
impl Medium for MemoryMedium {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, partition: &Partition, key: &str) -> Result<Option<StoredBlob>> {
        let Some(table) = self.table(partition) else {
            return Ok(None);
        };
        Ok(table.get(key).map(|entry| StoredBlob {
            bytes: entry.bytes.clone(),
            last_write: entry.written_at,
        }))
    }

    async fn store(
        &self,
        partition: &Partition,
        key: &str,
        bytes: Vec<u8>,
        written_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        // Insert while holding the registry entry so a concurrent delete
        // cannot drop the table between lookup and insert.
        self.partitions
            .entry(partition.clone())
            .or_insert_with(|| Arc::new(DashMap::new()))
            .insert(key.to_string(), MemoryEntry { bytes, written_at });
        Ok(written_at)
    }

    async fn delete(&self, partition: &Partition, key: &str) -> Result<bool> {
        let removed = match self.partitions.get(partition) {
            Some(table) => table.remove(key).is_some(),
            None => return Ok(false),
        };
        // The registry guard above is released; empty tables are dropped so
        // partitions that come and go do not accumulate.
        self.partitions.remove_if(partition, |_, table| table.is_empty());
        Ok(removed)
    }

    async fn list_keys(&self, partition: &Partition) -> Result<Vec<String>> {
        Ok(self
            .table(partition)
            .map(|table| table.iter().map(|entry| entry.key().clone()).collect())
            .unwrap_or_default())
    }
}
