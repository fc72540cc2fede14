//! Pluggable key-value state store with ETag concurrency and TTL expiry.
//!
//! A [`RecordStore`] holds typed [`Record`]s in one [`Partition`] of a
//! [`Medium`]. Every successful write stamps a fresh [`ETag`]; conditional
//! writes compare the caller's ETag against the stored one and fail with
//! [`StoreError::ConcurrencyConflict`] on mismatch. Records with a TTL
//! disappear once `last write + ttl` has passed, both lazily on access and
//! eagerly through [`RecordStore::sweep`].
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//! use kvstate::{ManualClock, MemoryMedium, Partition, Record, Storage};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> kvstate::Result<()> {
//! let clock = ManualClock::default();
//! let storage = Storage::builder(MemoryMedium::new())
//!     .clock(clock.clone())
//!     .build();
//! let carts = storage.open::<Vec<u32>>(Partition::new("shop", "carts"))?;
//!
//! carts
//!     .add("cart:7", Record::new(vec![1, 2]).with_ttl(Duration::from_secs(60)))
//!     .await?;
//! assert!(carts.contains_key("cart:7").await?);
//!
//! clock.advance(Duration::from_secs(120));
//! assert!(carts.try_get("cart:7").await?.is_none());
//! # Ok(())
//! # }
//! ```
//!
//! # Media
//!
//! | Medium | Persistence | Write timestamp |
//! |---|---|---|
//! | [`MemoryMedium`] | process lifetime | stored alongside the bytes |
//! | [`FilesystemMedium`] | one file per key | file mtime |
//! | [`RedbMedium`] | embedded database | stored in the row |

pub mod clock;
pub mod codec;
pub mod config;
mod engine;
pub mod error;
pub mod etag;
pub mod logging;
pub mod maintenance;
pub mod medium;
pub mod paths;
pub mod record;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Codec, JsonCodec};
pub use config::{BackendKind, Config, ValidationResult};
pub use error::{Result, StoreError};
pub use etag::{CounterEtags, EtagGenerator, EtagScheme, UuidEtags};
pub use maintenance::{Sweep, SweepReport, SweeperConfig, spawn_sweeper, sweep_all};
pub use medium::{
    FilesystemMedium, KeyRejected, Medium, MemoryMedium, Partition, RedbMedium, StoredBlob,
};
pub use record::{ETag, Record};
pub use store::{RecordStore, Storage, StorageBuilder};
