use std::sync::Arc;

use buds_core::Clock;
use buds_core::model::{
    EndTrigger, ModuleId, RoundTally, ScoringInput, ScoringPolicy, SessionOutcome,
    WordBuilderBreakdown,
};
use storage::repository::AnalyticsRepository;
use tracing::{debug, info, warn};

use crate::context::SessionContext;
use crate::error::ProgressError;
use crate::progress::{GameResult, ProgressService, SaveOutcome};

//
// ─── RECORDER ──────────────────────────────────────────────────────────────────
//

/// Persists finished sessions: local analytics first, then the module's save path.
#[derive(Clone)]
pub struct SessionRecorder {
    analytics: Arc<dyn AnalyticsRepository>,
    progress: ProgressService,
}

impl SessionRecorder {
    #[must_use]
    pub fn new(analytics: Arc<dyn AnalyticsRepository>, progress: ProgressService) -> Self {
        Self {
            analytics,
            progress,
        }
    }

    /// A failed analytics write is logged and does not block the progress save.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` from the progress save.
    pub async fn record(&self, outcome: &SessionOutcome) -> Result<SaveOutcome, ProgressError> {
        match self.analytics.record_game_session(&outcome.to_record()).await {
            Ok(row) => debug!(
                child = %outcome.child_id,
                module = %outcome.module,
                sessions = row.session_count,
                "analytics updated"
            ),
            Err(err) => warn!(child = %outcome.child_id, module = %outcome.module, %err, "local analytics write failed"),
        }

        let ctx = SessionContext::new(outcome.parent_id.clone(), outcome.child_id.clone());
        let scored = outcome.scored;
        let result = GameResult {
            score: scored.score,
            time_spent_ms: outcome.elapsed_ms(),
            stars: scored.stars,
            correct: outcome.tally.correct,
            incorrect: outcome.tally.incorrect,
        };
        match outcome.module.scoring() {
            ScoringPolicy::Media => {
                self.progress
                    .log_video_play(
                        &ctx,
                        outcome.module,
                        scored.score,
                        result.time_spent_ms,
                        scored.stars,
                        scored.completed,
                    )
                    .await
            }
            ScoringPolicy::Completion => {
                self.progress
                    .set_completion_percentage(&ctx, outcome.module, scored.score.value())
                    .await
            }
            ScoringPolicy::Accuracy if outcome.module == ModuleId::WordBuilder => {
                let breakdown = outcome.word_builder.unwrap_or_default();
                self.progress
                    .record_word_builder_session(&ctx, result, breakdown)
                    .await
            }
            _ => {
                self.progress
                    .record_game_session(&ctx, outcome.module, result)
                    .await
            }
        }
    }
}

//
// ─── TRACKER ───────────────────────────────────────────────────────────────────
//

/// A session that was ended and handed to the recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndedSession {
    pub outcome: SessionOutcome,
    pub saved: SaveOutcome,
}

/// Round counters for one module screen.
///
/// Pause, destroy and the exit button may all call [`SessionTracker::end`]; only
/// the first call records anything.
pub struct SessionTracker {
    ctx: SessionContext,
    module: ModuleId,
    clock: Clock,
    recorder: SessionRecorder,
    tally: RoundTally,
    word_builder: WordBuilderBreakdown,
    media_duration_ms: Option<u64>,
    supplied_score: Option<u32>,
    started_at_ms: Option<i64>,
    cancelled: bool,
    ended: bool,
}

impl SessionTracker {
    #[must_use]
    pub fn new(ctx: SessionContext, module: ModuleId, recorder: SessionRecorder) -> Self {
        Self {
            ctx,
            module,
            clock: Clock::default(),
            recorder,
            tally: RoundTally::default(),
            word_builder: WordBuilderBreakdown::default(),
            media_duration_ms: None,
            supplied_score: None,
            started_at_ms: None,
            cancelled: false,
            ended: false,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Swap the clock mid-session (tests drive elapsed time this way).
    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    #[must_use]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    #[must_use]
    pub fn tally(&self) -> &RoundTally {
        &self.tally
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Starts the clock. Counters restart from zero; calling it twice restarts.
    pub fn start(&mut self) {
        self.tally = RoundTally::default();
        self.word_builder = WordBuilderBreakdown::default();
        self.started_at_ms = Some(self.clock.now_millis());
        self.cancelled = false;
    }

    pub fn record_hit(&mut self) {
        self.tally.record_hit();
    }

    pub fn record_miss(&mut self) {
        self.tally.record_miss();
    }

    /// Word Builder rounds also count toward the parent-word breakdown.
    pub fn record_word(&mut self, parent_word: bool, correct: bool) {
        if correct {
            self.tally.record_hit();
        } else {
            self.tally.record_miss();
        }
        let (hits, attempts) = if parent_word {
            (&mut self.word_builder.parent_correct, &mut self.word_builder.parent_attempts)
        } else {
            (&mut self.word_builder.default_correct, &mut self.word_builder.default_attempts)
        };
        *attempts = attempts.saturating_add(1);
        if correct {
            *hits = hits.saturating_add(1);
        }
    }

    pub fn set_media_duration(&mut self, duration_ms: u64) {
        self.media_duration_ms = Some(duration_ms);
    }

    pub fn mark_all_photos_viewed(&mut self) {
        self.tally.all_photos_viewed = true;
    }

    /// Score reported by modules that compute their own.
    pub fn set_supplied_score(&mut self, score: u32) {
        self.supplied_score = Some(score);
    }

    /// Abandon the session; a later `end` records nothing.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Ends the session and records it, at most once per tracker.
    ///
    /// Returns `Ok(None)` for repeat calls, for sessions that were never started
    /// or were cancelled, and when the context lacks a parent or child id. An end
    /// before `start` leaves the tracker usable.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NotSaved` when neither store accepted the summary.
    pub async fn end(&mut self, trigger: EndTrigger) -> Result<Option<EndedSession>, ProgressError> {
        if self.ended {
            debug!(module = %self.module, trigger = trigger.as_str(), "session already ended");
            return Ok(None);
        }
        let Some(started_at_ms) = self.started_at_ms else {
            debug!(module = %self.module, "session never started; nothing recorded");
            return Ok(None);
        };
        self.ended = true;

        if self.cancelled {
            debug!(module = %self.module, "session cancelled; nothing recorded");
            return Ok(None);
        }
        let (parent_id, child_id) = match self.ctx.require() {
            Ok((parent, child)) => (parent.clone(), child.clone()),
            Err(err) => {
                warn!(module = %self.module, %err, "session ended without ids; nothing recorded");
                return Ok(None);
            }
        };

        let ended_at_ms = self.clock.now_millis().max(started_at_ms);
        let elapsed_ms = u64::try_from(ended_at_ms - started_at_ms).unwrap_or(0);
        let input = ScoringInput {
            elapsed_ms,
            media_duration_ms: self.media_duration_ms,
            supplied_score: self.supplied_score,
        };
        let scored = self.module.scoring().evaluate(&self.tally, &input);
        let word_builder =
            (self.module == ModuleId::WordBuilder).then_some(self.word_builder);

        let outcome = SessionOutcome {
            parent_id,
            child_id,
            module: self.module,
            started_at_ms,
            ended_at_ms,
            trigger,
            tally: self.tally,
            scored,
            word_builder,
        };
        let saved = self.recorder.record(&outcome).await?;
        info!(
            child = %outcome.child_id,
            module = %outcome.module,
            trigger = trigger.as_str(),
            score = scored.score.value(),
            stars = scored.stars,
            ?saved,
            "session recorded"
        );
        Ok(Some(EndedSession { outcome, saved }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buds_core::model::{ChildId, ParentId};
    use buds_core::time::fixed_clock;
    use chrono::Duration;
    use storage::remote::{DocumentStore, InMemoryDocumentStore, collections};
    use storage::repository::InMemoryRepository;

    use crate::rollup::RollupService;
    use crate::sync::SyncService;

    fn recorder(store: &InMemoryDocumentStore, repo: &Arc<InMemoryRepository>) -> SessionRecorder {
        let sync = SyncService::new(fixed_clock(), Arc::new(store.clone()));
        let rollup = RollupService::new(fixed_clock(), sync.clone(), repo.clone(), 7, 3);
        let progress =
            ProgressService::new(fixed_clock(), repo.clone(), repo.clone(), sync, rollup);
        SessionRecorder::new(repo.clone(), progress)
    }

    fn ctx() -> SessionContext {
        SessionContext::new(
            ParentId::new("p1").unwrap(),
            ChildId::new("p1_child_1").unwrap(),
        )
    }

    fn later(ms: i64) -> Clock {
        let mut clock = fixed_clock();
        clock.advance(Duration::milliseconds(ms));
        clock
    }

    #[tokio::test]
    async fn only_the_first_end_is_recorded() {
        let store = InMemoryDocumentStore::new();
        let repo = Arc::new(InMemoryRepository::new());
        let mut tracker = SessionTracker::new(ctx(), ModuleId::FeedMonster, recorder(&store, &repo))
            .with_clock(fixed_clock());
        tracker.start();
        tracker.record_hit();
        tracker.record_miss();

        let first = tracker.end(EndTrigger::Pause).await.unwrap().unwrap();
        assert_eq!(first.saved, SaveOutcome::Synced);
        let writes = store.write_count();
        assert!(tracker.end(EndTrigger::Destroy).await.unwrap().is_none());
        assert!(tracker.end(EndTrigger::ExitButton).await.unwrap().is_none());
        assert_eq!(store.write_count(), writes);

        let sessions = repo
            .sessions_for(&ChildId::new("p1_child_1").unwrap(), ModuleId::FeedMonster, 10)
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);
    }

    #[tokio::test]
    async fn song_completion_depends_on_watched_share() {
        let store = InMemoryDocumentStore::new();
        let repo = Arc::new(InMemoryRepository::new());
        let mut tracker = SessionTracker::new(ctx(), ModuleId::AbcSong, recorder(&store, &repo))
            .with_clock(fixed_clock());
        tracker.start();
        tracker.set_media_duration(100_000);
        tracker.set_clock(later(85_000));

        let ended = tracker.end(EndTrigger::Finished).await.unwrap().unwrap();
        assert!(ended.outcome.scored.completed);
        assert_eq!(ended.outcome.scored.score.value(), 100);
        assert_eq!(ended.outcome.scored.stars, 1);
        assert_eq!(ended.outcome.elapsed_ms(), 85_000);
    }

    #[tokio::test]
    async fn word_builder_keeps_parent_word_breakdown() {
        let store = InMemoryDocumentStore::new();
        let repo = Arc::new(InMemoryRepository::new());
        let mut tracker = SessionTracker::new(ctx(), ModuleId::WordBuilder, recorder(&store, &repo))
            .with_clock(fixed_clock());
        tracker.start();
        tracker.record_word(true, true);
        tracker.record_word(true, false);
        tracker.record_word(false, true);

        let ended = tracker.end(EndTrigger::ExitButton).await.unwrap().unwrap();
        let wb = ended.outcome.word_builder.unwrap();
        assert_eq!((wb.parent_correct, wb.parent_attempts), (1, 2));
        assert_eq!((wb.default_correct, wb.default_attempts), (1, 1));
        assert_eq!(ended.outcome.scored.score.value(), 67);

        let doc = store
            .get(collections::CHILD_PROGRESS, "p1_child_1_word_builder")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.get_u64("wbParentAttempts"), Some(2));
    }

    #[tokio::test]
    async fn gallery_and_family_screens_use_their_own_scoring() {
        let store = InMemoryDocumentStore::new();
        let repo = Arc::new(InMemoryRepository::new());

        let mut gallery =
            SessionTracker::new(ctx(), ModuleId::FamilyGallery, recorder(&store, &repo));
        gallery.start();
        for _ in 0..6 {
            gallery.record_hit();
        }
        gallery.mark_all_photos_viewed();
        let ended = gallery.end(EndTrigger::ExitButton).await.unwrap().unwrap();
        assert!(gallery.is_ended());
        assert_eq!(ended.outcome.scored.stars, 3);
        assert_eq!(ended.outcome.scored.score.value(), 30);

        let mut family =
            SessionTracker::new(ctx(), ModuleId::FamilyModule, recorder(&store, &repo));
        family.start();
        family.set_supplied_score(100);
        family.end(EndTrigger::Finished).await.unwrap().unwrap();

        let doc = store
            .get(collections::CHILD_PROGRESS, "p1_child_1_family_module")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.get_str("status"), Some("completed"));
        assert_eq!(doc.get_bool("completionStatus"), Some(true));
    }

    #[tokio::test]
    async fn cancelled_or_unstarted_sessions_record_nothing() {
        let store = InMemoryDocumentStore::new();
        let repo = Arc::new(InMemoryRepository::new());

        let mut idle = SessionTracker::new(ctx(), ModuleId::MatchLetter, recorder(&store, &repo));
        assert!(idle.end(EndTrigger::Destroy).await.unwrap().is_none());
        assert!(!idle.is_ended());

        let mut cancelled =
            SessionTracker::new(ctx(), ModuleId::MatchLetter, recorder(&store, &repo));
        cancelled.start();
        cancelled.record_hit();
        cancelled.cancel();
        assert!(cancelled.end(EndTrigger::Pause).await.unwrap().is_none());

        let mut anonymous = SessionTracker::new(
            SessionContext::default(),
            ModuleId::MatchLetter,
            recorder(&store, &repo),
        );
        anonymous.start();
        anonymous.record_hit();
        assert!(anonymous.end(EndTrigger::Finished).await.unwrap().is_none());

        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn pause_before_start_does_not_swallow_the_session() {
        let store = InMemoryDocumentStore::new();
        let repo = Arc::new(InMemoryRepository::new());
        let mut tracker =
            SessionTracker::new(ctx(), ModuleId::FeedMonster, recorder(&store, &repo));
        assert!(tracker.end(EndTrigger::Pause).await.unwrap().is_none());

        tracker.start();
        tracker.record_hit();
        let ended = tracker.end(EndTrigger::Finished).await.unwrap();
        assert!(ended.is_some());
        assert!(tracker.is_ended());
        assert!(tracker.end(EndTrigger::Destroy).await.unwrap().is_none());
        assert_eq!(store.len(collections::CHILD_PROGRESS), 1);
    }
}
