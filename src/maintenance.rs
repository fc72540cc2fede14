//! Host-scheduled eager expiration.
//!
//! The store never sweeps on its own. Hosts that want expired records
//! reclaimed without waiting for reads call [`RecordStore::sweep`] directly,
//! or hand a set of stores to [`spawn_sweeper`], which sweeps them all on a
//! fixed interval until the returned token is cancelled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::medium::Partition;
use crate::store::RecordStore;

/// Something that can sweep one partition, independent of its value type.
#[async_trait]
pub trait Sweep: Send + Sync {
    fn partition(&self) -> &Partition;

    /// Deletes every expired record and returns how many were removed.
    async fn sweep(&self) -> Result<usize>;
}

#[async_trait]
impl<V> Sweep for RecordStore<V>
where
    V: Send + Sync + 'static,
{
    fn partition(&self) -> &Partition {
        RecordStore::partition(self)
    }

    async fn sweep(&self) -> Result<usize> {
        RecordStore::sweep(self).await
    }
}

/// Configuration for the background sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Interval between sweep runs (default: 60 seconds).
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

/// Outcome of one pass over every target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

/// Spawns the periodic sweeper on the current tokio runtime.
///
/// Returns a CancellationToken that stops the task.
pub fn spawn_sweeper(targets: Vec<Arc<dyn Sweep>>, config: SweeperConfig) -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    tokio::spawn(async move {
        run_sweeper_loop(targets, config, cancel_clone).await;
    });

    cancel
}

async fn run_sweeper_loop(
    targets: Vec<Arc<dyn Sweep>>,
    config: SweeperConfig,
    cancel: CancellationToken,
) {
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        interval_secs = config.interval.as_secs(),
        partitions = targets.len(),
        "Sweeper started"
    );

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("Sweeper shutting down");
                break;
            }
            _ = ticker.tick() => {
                sweep_all(&targets).await;
            }
        }
    }
}

/// Sweeps each target once. A failing partition does not stop the others.
pub async fn sweep_all(targets: &[Arc<dyn Sweep>]) -> SweepReport {
    let mut report = SweepReport::default();

    for target in targets {
        match target.sweep().await {
            Ok(removed) => report.removed += removed,
            Err(e) if e.is_cancelled() => {
                debug!(partition = %target.partition(), "Sweep cancelled");
                report.failed += 1;
            },
            Err(e) => {
                warn!(partition = %target.partition(), error = %e, "Sweep failed");
                report.failed += 1;
            },
        }
    }

    if report.removed > 0 {
        info!(removed = report.removed, failed = report.failed, "Sweep pass completed");
    } else {
        debug!(failed = report.failed, "Sweep pass found nothing to remove");
    }
    report
}
