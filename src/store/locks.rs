//! Per-partition critical sections.

use crate::medium::Partition;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Registry handing out one async mutex per partition.
///
/// Clones share the registry, so every store opened from the same
/// [`Storage`](crate::Storage) (or its clones) serializes on the same lock.
#[derive(Clone, Default)]
pub(crate) struct PartitionLocks {
    locks: Arc<DashMap<Partition, Arc<Mutex<()>>>>,
}

impl PartitionLocks {
    pub(crate) fn lock_for(&self, partition: &Partition) -> Arc<Mutex<()>> {
        let lock = self
            .locks
            .entry(partition.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(lock.value())
    }
}
