//! The record store contract and its composition root.
//!
//! [`Storage`] wires a medium, a clock and an ETag generator together and
//! hands out [`RecordStore`]s bound to one partition. Every operation of a
//! `RecordStore` runs the same sequence regardless of medium:
//!
//! 1. enter the partition's critical section (cancellable)
//! 2. load the current record and drop it if it has expired
//! 3. apply the concurrency rule for the operation
//! 4. persist through the medium and return the new ETag
//!
//! # Example
//!
//! ```
//! use kvstate::{Partition, Record, Storage};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> kvstate::Result<()> {
//! let storage = Storage::memory();
//! let sessions = storage.open::<String>(Partition::new("app", "sessions"))?;
//!
//! let e1 = sessions.add("user:1", Record::new("alice".to_string())).await?;
//! let e2 = sessions
//!     .set("user:1", Record::new("bob".to_string()).with_etag(e1.clone()))
//!     .await?;
//! assert_ne!(e1, e2);
//!
//! // A stale ETag is rejected
//! let err = sessions
//!     .set("user:1", Record::new("carol".to_string()).with_etag(e1))
//!     .await
//!     .unwrap_err();
//! assert!(err.is_conflict());
//! # Ok(())
//! # }
//! ```

mod locks;

#[cfg(test)]
mod property_tests;

use crate::clock::{Clock, SystemClock};
use crate::codec::{Codec, JsonCodec};
use crate::config::{BackendKind, StorageConfig};
use crate::engine::concurrency::{self, RemoveVerdict, Upsert};
use crate::engine::expiration;
use crate::error::{Result, StoreError};
use crate::etag::{EtagGenerator, EtagScheme, UuidEtags};
use crate::medium::keys::validate_partition;
use crate::medium::{
    FilesystemMedium, KeyRejected, Medium, MemoryMedium, Partition, RedbMedium, StoredBlob,
};
use crate::record::{ETag, Record};
use locks::PartitionLocks;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Composition root shared by every store in a process.
///
/// `Storage` is `Clone`; clones share the medium, clock, ETag generator and
/// the per-partition lock registry.
#[derive(Clone)]
pub struct Storage {
    medium: Arc<dyn Medium>,
    clock: Arc<dyn Clock>,
    etags: Arc<dyn EtagGenerator>,
    locks: PartitionLocks,
}

impl Storage {
    /// Starts building a `Storage` over any medium.
    pub fn builder<M: Medium>(medium: M) -> StorageBuilder {
        StorageBuilder::new(Arc::new(medium))
    }

    /// In-memory storage with the system clock and UUID ETags.
    pub fn memory() -> Self {
        Self::builder(MemoryMedium::new()).build()
    }

    /// Filesystem storage rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn filesystem<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        Ok(Self::builder(FilesystemMedium::open(root)?).build())
    }

    /// Redb storage in the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn redb<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self::builder(RedbMedium::open(path)?).build())
    }

    /// Builds storage from the `[storage]` section of a host config.
    ///
    /// # Errors
    ///
    /// Returns an error if the default data directory cannot be resolved or
    /// the medium cannot be opened.
    pub fn from_config(config: &StorageConfig) -> anyhow::Result<Self> {
        let builder = match (config.backend, config.resolved_path()?) {
            (BackendKind::Filesystem, Some(root)) => Self::builder(FilesystemMedium::open(root)?),
            (BackendKind::Redb, Some(path)) => Self::builder(RedbMedium::open(path)?),
            _ => Self::builder(MemoryMedium::new()),
        };
        let storage = builder.etag_scheme(config.etag_scheme).build();

        info!(
            medium = storage.medium_name(),
            etag_scheme = ?config.etag_scheme,
            "Opened storage"
        );
        Ok(storage)
    }

    /// Opens a store for `partition` using the JSON codec.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if the database or container is empty.
    pub fn open<V>(&self, partition: Partition) -> Result<RecordStore<V>>
    where
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.open_with_codec(partition, JsonCodec::<V>::new())
    }

    /// Opens a store for `partition` with a custom codec.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`] if the database or container is empty.
    pub fn open_with_codec<V, C>(&self, partition: Partition, codec: C) -> Result<RecordStore<V>>
    where
        V: Send + Sync + 'static,
        C: Codec<V>,
    {
        validate_partition(&partition).map_err(|e| StoreError::invalid_key(e.to_string()))?;
        Ok(RecordStore {
            lock: self.locks.lock_for(&partition),
            partition,
            medium: Arc::clone(&self.medium),
            codec: Arc::new(codec),
            clock: Arc::clone(&self.clock),
            etags: Arc::clone(&self.etags),
            cancel: CancellationToken::new(),
        })
    }

    /// Name of the medium, e.g. `"filesystem"`.
    pub fn medium_name(&self) -> &'static str {
        self.medium.name()
    }

    /// ETag numbering scheme used by every store from this `Storage`.
    pub fn etag_scheme(&self) -> EtagScheme {
        self.etags.scheme()
    }
}

/// Builder for [`Storage`].
pub struct StorageBuilder {
    medium: Arc<dyn Medium>,
    clock: Arc<dyn Clock>,
    etags: Arc<dyn EtagGenerator>,
}

impl StorageBuilder {
    fn new(medium: Arc<dyn Medium>) -> Self {
        Self {
            medium,
            clock: Arc::new(SystemClock),
            etags: Arc::new(UuidEtags),
        }
    }

    /// Replaces the system clock, typically with a [`ManualClock`](crate::ManualClock).
    #[must_use]
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Selects one of the bundled ETag schemes.
    #[must_use]
    pub fn etag_scheme(mut self, scheme: EtagScheme) -> Self {
        self.etags = Arc::from(scheme.generator());
        self
    }

    /// Installs a custom ETag generator.
    #[must_use]
    pub fn etag_generator<G: EtagGenerator>(mut self, generator: G) -> Self {
        self.etags = Arc::new(generator);
        self
    }

    pub fn build(self) -> Storage {
        Storage {
            medium: self.medium,
            clock: self.clock,
            etags: self.etags,
            locks: PartitionLocks::default(),
        }
    }
}

/// Typed view of one partition implementing the store contract.
///
/// | Operation | Success | Failure |
/// |---|---|---|
/// | [`add`](Self::add) | new ETag | `DuplicateKey` |
/// | [`set`](Self::set) | new ETag | `KeyNotFound`, `ConcurrencyConflict` |
/// | [`add_or_update`](Self::add_or_update) | new ETag | `ConcurrencyConflict` |
/// | [`get`](Self::get) | live record | `KeyNotFound` |
/// | [`try_get`](Self::try_get) | `Option<Record>` | |
/// | [`contains_key`](Self::contains_key) | bool | |
/// | [`remove`](Self::remove) | bool | `ConcurrencyConflict` |
/// | [`sweep`](Self::sweep) | removed count | |
///
/// Any operation can also fail with `Medium`, `Codec`, `InvalidKey` or
/// `Cancelled`. Expired records are never returned; they are deleted on
/// first access and reported as absent.
pub struct RecordStore<V> {
    partition: Partition,
    medium: Arc<dyn Medium>,
    codec: Arc<dyn Codec<V>>,
    clock: Arc<dyn Clock>,
    etags: Arc<dyn EtagGenerator>,
    lock: Arc<Mutex<()>>,
    cancel: CancellationToken,
}

impl<V> Clone for RecordStore<V> {
    fn clone(&self) -> Self {
        Self {
            partition: self.partition.clone(),
            medium: Arc::clone(&self.medium),
            codec: Arc::clone(&self.codec),
            clock: Arc::clone(&self.clock),
            etags: Arc::clone(&self.etags),
            lock: Arc::clone(&self.lock),
            cancel: self.cancel.clone(),
        }
    }
}

impl<V> RecordStore<V>
where
    V: Send + Sync + 'static,
{
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn etag_scheme(&self) -> EtagScheme {
        self.etags.scheme()
    }

    /// Returns a handle whose operations observe `token`.
    ///
    /// Cancellation is honoured while waiting for the partition lock and
    /// right before the medium is mutated; in both cases the operation fails
    /// with [`StoreError::Cancelled`] and leaves the medium untouched.
    #[must_use]
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            cancel: token,
            ..self.clone()
        }
    }

    /// Inserts a record under a key that has no live record.
    ///
    /// Any ETag on `record` is ignored; a fresh one is assigned and returned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] if a live record already exists.
    pub async fn add(&self, key: &str, record: Record<V>) -> Result<ETag> {
        validate_key(key)?;
        let _guard = self.enter().await?;
        let current = self.load_live(key).await?;
        concurrency::check_add(key, current_etag(current.as_ref()))?;
        self.write(key, record, None).await
    }

    /// Replaces the live record under `key`.
    ///
    /// When `record.etag` is non-empty it must equal the stored ETag. A
    /// missing or empty ETag overwrites unconditionally.
    ///
    /// # Errors
    ///
    /// - [`StoreError::KeyNotFound`] if no live record exists
    /// - [`StoreError::ConcurrencyConflict`] if the supplied ETag is stale
    pub async fn set(&self, key: &str, record: Record<V>) -> Result<ETag> {
        validate_key(key)?;
        let _guard = self.enter().await?;
        let current = self.load_live(key).await?;
        let previous =
            concurrency::check_set(key, record.supplied_etag(), current_etag(current.as_ref()))?
                .clone();
        self.write(key, record, Some(&previous)).await
    }

    /// `set` when a live record exists, `add` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConcurrencyConflict`] on the `set` path with a stale ETag.
    pub async fn add_or_update(&self, key: &str, record: Record<V>) -> Result<ETag> {
        validate_key(key)?;
        let _guard = self.enter().await?;
        let current = self.load_live(key).await?;
        let current = current_etag(current.as_ref());

        match concurrency::choose_upsert(current) {
            Upsert::Add => {
                concurrency::check_add(key, current)?;
                self.write(key, record, None).await
            },
            Upsert::Set => {
                let previous = concurrency::check_set(key, record.supplied_etag(), current)?.clone();
                self.write(key, record, Some(&previous)).await
            },
        }
    }

    /// Returns the live record under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyNotFound`] if there is none.
    pub async fn get(&self, key: &str) -> Result<Record<V>> {
        self.try_get(key)
            .await?
            .ok_or_else(|| StoreError::key_not_found(key))
    }

    /// Returns the live record under `key`, or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error only for medium, codec, key or cancellation failures.
    pub async fn try_get(&self, key: &str) -> Result<Option<Record<V>>> {
        validate_key(key)?;
        let _guard = self.enter().await?;
        self.load_live(key).await
    }

    /// Whether a live record exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error only for medium, codec, key or cancellation failures.
    pub async fn contains_key(&self, key: &str) -> Result<bool> {
        Ok(self.try_get(key).await?.is_some())
    }

    /// Removes the live record under `key`.
    ///
    /// Returns `Ok(false)` if there is nothing live to remove. A non-empty
    /// `etag` must match the stored one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConcurrencyConflict`] if `etag` is stale.
    pub async fn remove(&self, key: &str, etag: Option<&ETag>) -> Result<bool> {
        validate_key(key)?;
        let _guard = self.enter().await?;
        let current = self.load_live(key).await?;

        match concurrency::check_remove(key, etag, current_etag(current.as_ref()))? {
            RemoveVerdict::Absent => Ok(false),
            RemoveVerdict::Delete => {
                self.ensure_not_cancelled()?;
                let removed = self.delete(key).await?;
                debug!(partition = %self.partition, key, "Removed record");
                Ok(removed)
            },
        }
    }

    /// Deletes every expired record in the partition.
    ///
    /// Returns the number of records removed. Running it again with no
    /// intervening writes removes nothing. Records that cannot be decoded
    /// are logged and left in place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Cancelled`] if cancelled between keys, or the
    /// first medium failure.
    pub async fn sweep(&self) -> Result<usize> {
        let keys = self
            .medium
            .list_keys(&self.partition)
            .await
            .map_err(|e| self.medium_error(e))?;

        let mut removed = 0;
        for key in keys {
            let _guard = self.enter().await?;
            if self.reclaim_if_expired(&key).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(partition = %self.partition, removed, "Swept expired records");
        } else {
            debug!(partition = %self.partition, "Sweep found no expired records");
        }
        Ok(removed)
    }

    async fn enter(&self) -> Result<MutexGuard<'_, ()>> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(StoreError::Cancelled),
            guard = self.lock.lock() => Ok(guard),
        }
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }

    /// Loads `key` and applies the lazy expiry check. Must hold the lock.
    async fn load_live(&self, key: &str) -> Result<Option<Record<V>>> {
        let Some(blob) = self.load(key).await? else {
            return Ok(None);
        };

        let record = self
            .codec
            .decode(&blob.bytes)
            .map_err(|e| StoreError::codec(key, e))?;
        if record.etag.as_ref().is_none_or(ETag::is_empty) {
            return Err(StoreError::codec(
                key,
                anyhow::anyhow!("Stored record has no etag"),
            ));
        }

        if self.is_live(&blob, &record) {
            return Ok(Some(record));
        }

        debug!(partition = %self.partition, key, "Removing expired record");
        self.delete(key).await?;
        Ok(None)
    }

    /// Sweep step for one key. Must hold the lock.
    async fn reclaim_if_expired(&self, key: &str) -> Result<bool> {
        let Some(blob) = self.load(key).await? else {
            return Ok(false);
        };

        let record = match self.codec.decode(&blob.bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(partition = %self.partition, key, error = %e, "Skipping undecodable record during sweep");
                return Ok(false);
            },
        };

        if self.is_live(&blob, &record) {
            return Ok(false);
        }
        self.delete(key).await
    }

    fn is_live(&self, blob: &StoredBlob, record: &Record<V>) -> bool {
        expiration::is_live(blob.last_write, record.ttl, self.clock.now())
    }

    /// Stamps a fresh ETag and persists. Must hold the lock.
    async fn write(&self, key: &str, record: Record<V>, previous: Option<&ETag>) -> Result<ETag> {
        let etag = self.etags.next(previous);
        let ttl = record.effective_ttl();
        let bytes = self
            .codec
            .encode(&record.value, &etag, ttl)
            .map_err(|e| StoreError::codec(key, e))?;

        self.ensure_not_cancelled()?;
        let last_write = self
            .medium
            .store(&self.partition, key, bytes, self.clock.now())
            .await
            .map_err(|e| self.medium_error(e))?;

        debug!(
            partition = %self.partition,
            key,
            etag = %etag,
            %last_write,
            ttl = ?ttl,
            "Stored record"
        );
        Ok(etag)
    }

    async fn load(&self, key: &str) -> Result<Option<StoredBlob>> {
        self.medium
            .load(&self.partition, key)
            .await
            .map_err(|e| self.medium_error(e))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.medium
            .delete(&self.partition, key)
            .await
            .map_err(|e| self.medium_error(e))
    }

    fn medium_error(&self, error: anyhow::Error) -> StoreError {
        match error.downcast_ref::<KeyRejected>() {
            Some(rejected) => StoreError::invalid_key(rejected.reason.clone()),
            None => StoreError::medium(self.medium.name(), error),
        }
    }
}

fn current_etag<V>(current: Option<&Record<V>>) -> Option<&ETag> {
    current.and_then(|record| record.etag.as_ref())
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StoreError::invalid_key("key cannot be empty"));
    }
    Ok(())
}
