//! Storage media the record store runs on.
//!
//! A medium is a dumb blob store scoped by [`Partition`]. It knows nothing
//! about ETags or TTLs; [`RecordStore`](crate::RecordStore) applies those
//! rules on top of the narrow [`Medium`] interface.
//!
//! Bundled media:
//!
//! - [`MemoryMedium`]: process-local tables (testing, embedding, caching)
//! - [`FilesystemMedium`]: one JSON file per key, native mtime as write time
//! - [`RedbMedium`]: embedded redb database with ACID writes
//!
//! # Custom Media
//!
//! ```ignore
//! use kvstate::{Medium, Partition, StoredBlob, Storage};
//!
//! struct RedisMedium { /* ... */ }
//!
//! #[async_trait::async_trait]
//! impl Medium for RedisMedium { /* ... */ }
//!
//! let storage = Storage::builder(RedisMedium::connect("redis://...")?).build();
//! ```

mod filesystem;
pub(crate) mod keys;
mod memory;
mod redb;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use filesystem::FilesystemMedium;
pub use keys::MAX_FILE_NAME_LEN;
pub use memory::MemoryMedium;
pub use self::redb::RedbMedium;

/// Logical grouping within which keys are unique and sweeps operate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    database: String,
    container: String,
}

impl Partition {
    pub fn new(database: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            container: container.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn container(&self) -> &str {
        &self.container
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.database, self.container)
    }
}

/// A key or partition name a medium cannot represent.
///
/// Media return it inside their `anyhow::Error`; the store reports it as
/// [`StoreError::InvalidKey`](crate::StoreError::InvalidKey) rather than a
/// medium failure.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct KeyRejected {
    pub reason: String,
}

impl KeyRejected {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Bytes loaded from a medium plus the instant they were last written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub last_write: DateTime<Utc>,
}

/// Raw storage interface implemented by every backend.
///
/// All media must be thread-safe (`Send + Sync`) for use with tokio.
/// Each individual call must be atomic with respect to readers: a `load`
/// never observes half of a `store`.
#[async_trait]
pub trait Medium: Send + Sync + 'static {
    /// Short name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Loads the blob stored under `key`.
    ///
    /// Returns `Ok(None)` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn load(&self, partition: &Partition, key: &str) -> Result<Option<StoredBlob>>;

    /// Stores `bytes` under `key`, replacing any previous blob.
    ///
    /// `written_at` is the store clock's instant for this write. Media that
    /// keep their own timestamp return the one they actually recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn store(
        &self,
        partition: &Partition,
        key: &str,
        bytes: Vec<u8>,
        written_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>>;

    /// Deletes the blob under `key`.
    ///
    /// Returns `Ok(true)` if something was removed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn delete(&self, partition: &Partition, key: &str) -> Result<bool>;

    /// Lists every key stored in the partition, expired or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn list_keys(&self, partition: &Partition) -> Result<Vec<String>>;
}
