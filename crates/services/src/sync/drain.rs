use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use buds_core::Clock;
use buds_core::model::{ChildId, ModuleId, SyncOperation, SyncQueueItem, SyncTable};
use storage::repository::{
    ChildProfileRepository, ProgressCacheRepository, StorageError, SyncQueueRepository,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::SyncService;
use crate::error::SyncError;
use crate::rollup::RollupService;

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub pushed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl DrainReport {
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pushed == 0 && self.failed == 0 && self.skipped == 0
    }
}

/// Retries everything that did not reach the remote store the first time.
pub struct SyncDrain {
    clock: Clock,
    progress: Arc<dyn ProgressCacheRepository>,
    queue: Arc<dyn SyncQueueRepository>,
    children: Arc<dyn ChildProfileRepository>,
    sync: SyncService,
    rollup: RollupService,
    max_attempts: u32,
    batch_size: u32,
}

impl SyncDrain {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressCacheRepository>,
        queue: Arc<dyn SyncQueueRepository>,
        children: Arc<dyn ChildProfileRepository>,
        sync: SyncService,
        rollup: RollupService,
        max_attempts: u32,
        batch_size: u32,
    ) -> Self {
        Self {
            clock,
            progress,
            queue,
            children,
            sync,
            rollup,
            max_attempts,
            batch_size: batch_size.max(1),
        }
    }

    #[must_use]
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// One pass over unsynced cache rows and pending queue items.
    ///
    /// Stops early when the remote store is unreachable; everything left over stays
    /// pending for the next pass. Unsynced rows are pushed on every pass whatever
    /// their queue item says: `max_attempts` only parks the item, the row still
    /// holds undelivered plays.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the local store cannot be read or updated.
    pub async fn drain_once(&self, limit: u32) -> Result<DrainReport, SyncError> {
        let mut report = DrainReport::default();
        let mut touched: BTreeMap<ChildId, BTreeSet<ModuleId>> = BTreeMap::new();
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);

        let rows = self.progress.unsynced_progress().await?;
        for row in rows.into_iter().take(limit) {
            match self.sync.push_cached(&row).await {
                Ok(_) => {
                    self.progress.mark_progress_synced(&row.progress_id).await?;
                    self.queue
                        .clear_record(SyncTable::ChildProgress, &row.progress_id)
                        .await?;
                    touched.entry(row.child_id.clone()).or_default().insert(row.module);
                    report.pushed += 1;
                }
                Err(err) => {
                    let id = self
                        .queue
                        .enqueue(
                            SyncTable::ChildProgress,
                            &row.progress_id,
                            SyncOperation::Upsert,
                            self.clock.now_millis(),
                        )
                        .await?;
                    self.queue
                        .mark_failed(id, &err.to_string(), self.max_attempts)
                        .await?;
                    report.failed += 1;
                    if err.is_unavailable() {
                        warn!(%err, "remote store unreachable; drain pass stopped");
                        self.refresh_touched(&touched).await;
                        return Ok(report);
                    }
                }
            }
        }

        for item in self.queue.pending(self.batch_size).await? {
            match self.handle_item(&item).await? {
                ItemResult::Pushed => report.pushed += 1,
                ItemResult::Skipped => report.skipped += 1,
                ItemResult::Failed { unreachable } => {
                    report.failed += 1;
                    if unreachable {
                        break;
                    }
                }
            }
        }

        self.refresh_touched(&touched).await;
        if !report.is_idle() {
            info!(
                pushed = report.pushed,
                failed = report.failed,
                skipped = report.skipped,
                "sync drain pass finished"
            );
        }
        Ok(report)
    }

    async fn handle_item(&self, item: &SyncQueueItem) -> Result<ItemResult, SyncError> {
        match item.table {
            SyncTable::ChildProgress => match self.progress.get_progress(&item.record_id).await {
                // Rows left unsynced here fell outside this pass's limit.
                Ok(row) if !row.synced => Ok(ItemResult::Skipped),
                Ok(_) => {
                    self.queue.mark_synced(item.id).await?;
                    Ok(ItemResult::Skipped)
                }
                Err(StorageError::NotFound) => self.drop_item(item).await,
                Err(err) => Err(err.into()),
            },
            SyncTable::ChildProfiles => {
                let Ok(child) = ChildId::new(&item.record_id) else {
                    return self.drop_item(item).await;
                };
                let profile = match self.children.get_child(&child).await {
                    Ok(profile) => profile,
                    Err(StorageError::NotFound) => return self.drop_item(item).await,
                    Err(err) => return Err(err.into()),
                };
                match self.sync.publish_profile(&profile).await {
                    Ok(_) => {
                        self.queue.mark_synced(item.id).await?;
                        Ok(ItemResult::Pushed)
                    }
                    Err(err) => {
                        self.queue
                            .mark_failed(item.id, &err.to_string(), self.max_attempts)
                            .await?;
                        Ok(ItemResult::Failed {
                            unreachable: err.is_unavailable(),
                        })
                    }
                }
            }
        }
    }

    async fn drop_item(&self, item: &SyncQueueItem) -> Result<ItemResult, SyncError> {
        warn!(id = item.id, table = %item.table, record = %item.record_id, "queued record no longer exists");
        self.queue
            .mark_failed(item.id, "record no longer exists", 1)
            .await?;
        Ok(ItemResult::Failed { unreachable: false })
    }

    async fn refresh_touched(&self, touched: &BTreeMap<ChildId, BTreeSet<ModuleId>>) {
        for (child, modules) in touched {
            if let Err(err) = self.rollup.recompute(child).await {
                warn!(%child, %err, "rollup after drain failed");
            }
            for module in modules {
                if let Err(err) = self.sync.refresh_analytics(child, *module).await {
                    warn!(%child, %module, %err, "analytics refresh after drain failed");
                }
            }
        }
    }
}

enum ItemResult {
    Pushed,
    Skipped,
    Failed { unreachable: bool },
}

/// Runs [`SyncDrain::drain_once`] on every tick until `shutdown` flips to `true`
/// or its sender is dropped.
pub fn spawn_sync_worker(
    drain: Arc<SyncDrain>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = interval.as_millis(), "sync worker started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match drain.drain_once(drain.batch_size()).await {
                        Ok(report) if report.is_idle() => debug!("nothing to sync"),
                        Ok(_) => {}
                        Err(err) => warn!(%err, "sync drain pass failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("sync worker stopped");
    })
}
