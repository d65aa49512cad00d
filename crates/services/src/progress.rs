//! Caller-facing progress API used by the mini-game screens.

use std::collections::BTreeSet;
use std::sync::Arc;

use buds_core::Clock;
use buds_core::model::{
    CachedProgress, ChildId, ModuleId, ParentId, ProgressKey, ProgressStatus, ProgressSummary,
    Score, SyncOperation, SyncTable, WordBuilderBreakdown,
};
use storage::remote::RemoteError;
use storage::repository::{ProgressCacheRepository, StorageError, SyncQueueRepository};
use tracing::{debug, info, warn};

use crate::context::SessionContext;
use crate::error::{ProgressError, SyncError};
use crate::rollup::RollupService;
use crate::sync::SyncService;

/// Where a saved summary ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Cached locally and written to the remote store.
    Synced,
    /// Only the local cache has it; the sync queue will retry.
    SavedLocally,
}

/// Results of one play, as reported by a game screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GameResult {
    pub score: Score,
    pub time_spent_ms: u64,
    pub stars: u32,
    pub correct: u32,
    pub incorrect: u32,
}

/// How a summary reaches its remote document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Push {
    /// Create the document or merge into it.
    Merge,
    /// Merge into a document read moments ago; recreated if it has since gone.
    Update,
}

#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    progress: Arc<dyn ProgressCacheRepository>,
    queue: Arc<dyn SyncQueueRepository>,
    sync: SyncService,
    rollup: RollupService,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressCacheRepository>,
        queue: Arc<dyn SyncQueueRepository>,
        sync: SyncService,
        rollup: RollupService,
    ) -> Self {
        Self {
            clock,
            progress,
            queue,
            sync,
            rollup,
        }
    }

    //
    // ─── SAVE PATHS ────────────────────────────────────────────────────────────
    //

    /// Record a finished game session. Completion follows the score alone.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotAuthenticated` or `MissingIdentifier` before any
    /// write, and `ProgressError::NotSaved` when neither store accepted the summary.
    pub async fn record_game_session(
        &self,
        ctx: &SessionContext,
        module: ModuleId,
        result: GameResult,
    ) -> Result<SaveOutcome, ProgressError> {
        let summary = self.played(ctx, module, result)?;
        self.save(summary, Push::Merge).await
    }

    /// Like [`Self::record_game_session`] with the parent-word breakdown attached.
    ///
    /// # Errors
    ///
    /// See [`Self::record_game_session`].
    pub async fn record_word_builder_session(
        &self,
        ctx: &SessionContext,
        result: GameResult,
        breakdown: WordBuilderBreakdown,
    ) -> Result<SaveOutcome, ProgressError> {
        let mut summary = self.played(ctx, ModuleId::WordBuilder, result)?;
        summary.word_builder = Some(breakdown);
        self.save(summary, Push::Merge).await
    }

    /// Record a sing-along play. Completion is the caller's watched-enough flag.
    ///
    /// # Errors
    ///
    /// See [`Self::record_game_session`].
    pub async fn log_video_play(
        &self,
        ctx: &SessionContext,
        module: ModuleId,
        score: Score,
        time_spent_ms: u64,
        stars: u32,
        completed: bool,
    ) -> Result<SaveOutcome, ProgressError> {
        let (parent, child) = ctx.require()?;
        let mut summary = ProgressSummary::new(
            parent.clone(),
            child.clone(),
            module,
            self.clock.now_millis(),
        );
        summary.score = score;
        summary.status = if completed {
            ProgressStatus::Completed
        } else {
            ProgressStatus::InProgress
        };
        summary.completion_flag = completed;
        summary.stars = stars;
        summary.plays = 1;
        summary.time_spent_ms = time_spent_ms;
        summary.total_time_ms = time_spent_ms;
        self.save(summary, Push::Merge).await
    }

    /// Mark a module completed without a play attached.
    ///
    /// Stars and last-session time are carried over from the local cache so the
    /// merge does not wipe them.
    ///
    /// # Errors
    ///
    /// See [`Self::record_game_session`].
    pub async fn mark_module_completed(
        &self,
        ctx: &SessionContext,
        module: ModuleId,
        score: Score,
    ) -> Result<SaveOutcome, ProgressError> {
        let (parent, child) = ctx.require()?;
        let key = ProgressKey::new(child.clone(), module);
        let mut summary = match self.progress.get_progress(&key.to_string()).await {
            Ok(row) => row.to_summary(),
            Err(StorageError::NotFound) => {
                ProgressSummary::new(parent.clone(), child.clone(), module, 0)
            }
            Err(err) => {
                warn!(%key, %err, "could not read cached progress");
                ProgressSummary::new(parent.clone(), child.clone(), module, 0)
            }
        };
        summary.clear_play_counters();
        summary.parent_id = parent.clone();
        summary.score = score;
        summary.status = ProgressStatus::Completed;
        summary.completion_flag = score.meets_completion();
        summary.updated_at_ms = self.clock.now_millis();
        self.save(summary, Push::Merge).await
    }

    /// Update an existing summary from a percentage, or fall through to
    /// [`Self::mark_module_completed`] when there is none.
    ///
    /// Status becomes completed only at 100%; the completion flag is set from 70%.
    /// A summary found remotely is updated in place; when the remote store is
    /// unreachable the local cache decides whether a summary exists.
    ///
    /// # Errors
    ///
    /// See [`Self::record_game_session`].
    pub async fn set_completion_percentage(
        &self,
        ctx: &SessionContext,
        module: ModuleId,
        percentage: u32,
    ) -> Result<SaveOutcome, ProgressError> {
        let (parent, child) = ctx.require()?;
        let key = ProgressKey::new(child.clone(), module);
        let existing = match self.sync.fetch_summary(&key).await {
            Ok(found) => found.map(|summary| (summary, Push::Update)),
            Err(err) => {
                debug!(%key, %err, "remote lookup failed; checking local cache");
                match self.progress.get_progress(&key.to_string()).await {
                    Ok(row) => Some((row.to_summary(), Push::Merge)),
                    Err(_) => None,
                }
            }
        };

        let Some((mut summary, push)) = existing else {
            return self
                .mark_module_completed(ctx, module, Score::new(percentage))
                .await;
        };
        summary.parent_id = parent.clone();
        summary.score = Score::new(percentage);
        summary.status = if percentage >= Score::MAX {
            ProgressStatus::Completed
        } else {
            ProgressStatus::InProgress
        };
        summary.completion_flag = summary.score.meets_completion();
        summary.clear_play_counters();
        summary.updated_at_ms = self.clock.now_millis();
        self.save(summary, push).await
    }

    //
    // ─── READS ─────────────────────────────────────────────────────────────────
    //

    /// All remote summaries for the given children of `parent`.
    ///
    /// Each one is cached locally as synced, except where the cache holds an
    /// unsynced row that still has to be pushed.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Sync` if the remote query fails.
    pub async fn fetch_progress_for_parent(
        &self,
        parent: &ParentId,
        child_ids: &[ChildId],
    ) -> Result<Vec<ProgressSummary>, ProgressError> {
        if child_ids.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: BTreeSet<&ChildId> = child_ids.iter().collect();
        let summaries: Vec<_> = self
            .sync
            .query_summaries(parent, None)
            .await?
            .into_iter()
            .filter(|s| wanted.contains(&s.child_id))
            .collect();

        for summary in &summaries {
            self.cache_fetched(summary).await;
        }
        for child in child_ids {
            if !summaries.iter().any(|s| &s.child_id == child) {
                info!(%child, "no progress recorded yet");
            }
        }
        Ok(summaries)
    }

    /// Mean score over the given summaries, 0 when there are none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_score(summaries: &[ProgressSummary]) -> f64 {
        if summaries.is_empty() {
            return 0.0;
        }
        let total: u64 = summaries.iter().map(|s| u64::from(s.score.value())).sum();
        total as f64 / summaries.len() as f64
    }

    //
    // ─── PIPELINE ──────────────────────────────────────────────────────────────
    //

    fn played(
        &self,
        ctx: &SessionContext,
        module: ModuleId,
        result: GameResult,
    ) -> Result<ProgressSummary, ProgressError> {
        let (parent, child) = ctx.require()?;
        let mut summary = ProgressSummary::new(
            parent.clone(),
            child.clone(),
            module,
            self.clock.now_millis(),
        );
        summary.score = result.score;
        summary.status = ProgressStatus::from_score(result.score);
        summary.completion_flag = result.score.meets_completion();
        summary.stars = result.stars;
        summary.plays = 1;
        summary.time_spent_ms = result.time_spent_ms;
        summary.total_time_ms = result.time_spent_ms;
        summary.correct = result.correct;
        summary.incorrect = result.incorrect;
        Ok(summary)
    }

    async fn save(
        &self,
        mut summary: ProgressSummary,
        push: Push,
    ) -> Result<SaveOutcome, ProgressError> {
        let key = summary.key().to_string();
        match self.progress.get_progress(&key).await {
            Ok(earlier) => summary.absorb_pending(&earlier),
            Err(StorageError::NotFound) => {}
            Err(err) => warn!(%key, %err, "could not read cached progress"),
        }

        let row = CachedProgress::from_summary(&summary);
        let local = self.progress.upsert_progress(&row).await;
        if let Err(err) = &local {
            warn!(key = %row.progress_id, %err, "local progress cache write failed");
        }

        let pushed = match push {
            Push::Merge => self.sync.push_summary(&summary).await,
            Push::Update => match self.sync.update_summary(&summary).await {
                Err(SyncError::Remote(RemoteError::NotFound)) => {
                    debug!(%key, "progress document vanished; recreating");
                    self.sync.push_summary(&summary).await
                }
                other => other,
            },
        };
        match pushed {
            Ok(_) => {
                if local.is_ok() {
                    if let Err(err) = self.progress.mark_progress_synced(&row.progress_id).await {
                        warn!(key = %row.progress_id, %err, "could not flag cached progress as synced");
                    }
                }
                self.after_push(&summary).await;
                Ok(SaveOutcome::Synced)
            }
            Err(remote) => match local {
                Ok(()) => {
                    warn!(key = %row.progress_id, err = %remote, "remote write failed; saved locally");
                    if let Err(err) = self
                        .queue
                        .enqueue(
                            SyncTable::ChildProgress,
                            &row.progress_id,
                            SyncOperation::Upsert,
                            self.clock.now_millis(),
                        )
                        .await
                    {
                        warn!(key = %row.progress_id, %err, "could not queue progress for retry");
                    }
                    Ok(SaveOutcome::SavedLocally)
                }
                Err(local) => Err(ProgressError::NotSaved { local, remote }),
            },
        }
    }

    async fn after_push(&self, summary: &ProgressSummary) {
        if let Err(err) = self.rollup.recompute(&summary.child_id).await {
            warn!(child = %summary.child_id, %err, "rollup failed");
        }
        if let Err(err) = self
            .sync
            .refresh_analytics(&summary.child_id, summary.module)
            .await
        {
            warn!(child = %summary.child_id, module = %summary.module, %err, "analytics refresh failed");
        }
    }

    async fn cache_fetched(&self, summary: &ProgressSummary) {
        let key = summary.key().to_string();
        match self.progress.get_progress(&key).await {
            Ok(local) if !local.synced => {
                debug!(%key, "keeping unsynced local row");
                return;
            }
            Ok(_) | Err(StorageError::NotFound) => {}
            Err(err) => {
                warn!(%key, %err, "could not read cached progress");
                return;
            }
        }
        let mut row = CachedProgress::from_summary(summary);
        row.mark_delivered();
        if let Err(err) = self.progress.upsert_progress(&row).await {
            warn!(%key, %err, "could not cache fetched progress");
        }
    }
}
