use std::sync::Arc;

use buds_core::model::ChildId;
use buds_core::{Clock, Rollup};
use storage::remote::{RemoteError, collections};
use storage::repository::{ChildProfileRepository, StorageError};
use tracing::{debug, info, warn};

use crate::error::{RollupError, SyncError};
use crate::sync::{SyncService, documents};

/// Recomputes a child's overall progress and stars from their module summaries.
#[derive(Clone)]
pub struct RollupService {
    clock: Clock,
    sync: SyncService,
    children: Arc<dyn ChildProfileRepository>,
    total_modules: u32,
    max_attempts: u32,
}

impl RollupService {
    #[must_use]
    pub fn new(
        clock: Clock,
        sync: SyncService,
        children: Arc<dyn ChildProfileRepository>,
        total_modules: u32,
        max_attempts: u32,
    ) -> Self {
        Self {
            clock,
            sync,
            children,
            total_modules,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Full re-scan of the child's summaries followed by a versioned write to
    /// `child_profiles/{child}`.
    ///
    /// Returns `None` when the child has no summaries yet; the profile is left alone.
    ///
    /// # Errors
    ///
    /// Returns `RollupError::Contended` when every attempt lost a version race, or
    /// `RollupError::Remote` if the store cannot be reached.
    pub async fn recompute(&self, child: &ChildId) -> Result<Option<Rollup>, RollupError> {
        for attempt in 1..=self.max_attempts {
            let summaries = self
                .sync
                .summaries_for_child(child)
                .await
                .map_err(remote_or_storage)?;
            if summaries.is_empty() {
                debug!(%child, "no summaries; rollup skipped");
                return Ok(None);
            }
            let rollup = Rollup::from_summaries(&summaries, self.total_modules);

            let store = self.sync.store();
            let expected = store
                .get(collections::CHILD_PROFILES, child.as_str())
                .await?
                .map(|doc| doc.version);
            let write = documents::rollup_write(&rollup, self.clock.now_millis());

            match store
                .compare_and_set(collections::CHILD_PROFILES, child.as_str(), expected, &write)
                .await
            {
                Ok(version) => {
                    info!(
                        %child,
                        completed = rollup.completed_modules,
                        progress = rollup.progress_percent,
                        stars = rollup.stars,
                        version,
                        "rollup written"
                    );
                    self.update_local(child, &rollup, version).await;
                    return Ok(Some(rollup));
                }
                Err(RemoteError::VersionConflict { expected, actual }) => {
                    debug!(%child, attempt, ?expected, actual, "rollup lost a version race");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(RollupError::Contended {
            child: child.to_string(),
            attempts: self.max_attempts,
        })
    }

    async fn update_local(&self, child: &ChildId, rollup: &Rollup, version: u64) {
        let mut profile = match self.children.get_child(child).await {
            Ok(profile) => profile,
            Err(StorageError::NotFound) => return,
            Err(err) => {
                warn!(%child, %err, "could not read cached profile for rollup");
                return;
            }
        };
        profile.apply_rollup(rollup, version, self.clock.now_millis());
        if let Err(err) = self.children.upsert_child(&profile).await {
            warn!(%child, %err, "could not cache rollup locally");
        }
    }
}

fn remote_or_storage(err: SyncError) -> RollupError {
    match err {
        SyncError::Remote(err) => RollupError::Remote(err),
        SyncError::Storage(err) => RollupError::Storage(err),
    }
}
