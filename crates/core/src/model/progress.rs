use serde::{Deserialize, Serialize};

use crate::model::{ChildId, ModuleId, ModuleKind, ParentId, ProgressKey};

/// Minimum score at which a module counts as completed on score alone.
pub const COMPLETION_SCORE_THRESHOLD: u32 = 70;

//
// ─── SCORE ─────────────────────────────────────────────────────────────────────
//

/// Percentage score in `0..=100`.
///
/// Values above 100 saturate instead of failing: points-per-hit games can
/// overshoot on long sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Score(u32);

impl Score {
    pub const MAX: u32 = 100;

    #[must_use]
    pub fn new(value: u32) -> Self {
        Self(value.min(Self::MAX))
    }

    /// Saturating conversion from a signed value (negative becomes 0).
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        Self::new(u32::try_from(value.max(0)).unwrap_or(u32::MAX))
    }

    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn meets_completion(self) -> bool {
        self.0 >= COMPLETION_SCORE_THRESHOLD
    }
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStatus {
    Completed,
    InProgress,
}

impl ProgressStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::Completed => "completed",
            ProgressStatus::InProgress => "in_progress",
        }
    }

    /// Lenient parse: only a case-insensitive "completed" means completed.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("completed") {
            ProgressStatus::Completed
        } else {
            ProgressStatus::InProgress
        }
    }

    #[must_use]
    pub fn from_score(score: Score) -> Self {
        if score.meets_completion() {
            ProgressStatus::Completed
        } else {
            ProgressStatus::InProgress
        }
    }
}

/// Completion rule shared by every reader of summaries.
///
/// Any one signal is enough: a passing score, a "completed" status, or an
/// explicit completion flag.
#[must_use]
pub fn is_completed(score: Score, status: ProgressStatus, completion_flag: bool) -> bool {
    score.meets_completion() || status == ProgressStatus::Completed || completion_flag
}

//
// ─── SUMMARY ───────────────────────────────────────────────────────────────────
//

/// Parent-word versus default-word results from a Word Builder session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WordBuilderBreakdown {
    pub parent_correct: u32,
    pub parent_attempts: u32,
    pub default_correct: u32,
    pub default_attempts: u32,
}

/// Latest-known outcome of a child's play of one module.
///
/// One summary exists per (child, module). `plays` and `total_time_ms` are
/// running counters; every other field holds the latest session's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSummary {
    pub parent_id: ParentId,
    pub child_id: ChildId,
    pub module: ModuleId,
    pub kind: ModuleKind,
    pub score: Score,
    pub status: ProgressStatus,
    pub completion_flag: bool,
    pub stars: u32,
    pub plays: u32,
    pub time_spent_ms: u64,
    pub total_time_ms: u64,
    pub correct: u32,
    pub incorrect: u32,
    pub updated_at_ms: i64,
    pub word_builder: Option<WordBuilderBreakdown>,
}

impl ProgressSummary {
    /// Blank summary for a module that has just been touched.
    #[must_use]
    pub fn new(parent_id: ParentId, child_id: ChildId, module: ModuleId, updated_at_ms: i64) -> Self {
        Self {
            parent_id,
            child_id,
            module,
            kind: module.kind(),
            score: Score::default(),
            status: ProgressStatus::InProgress,
            completion_flag: false,
            stars: 0,
            plays: 0,
            time_spent_ms: 0,
            total_time_ms: 0,
            correct: 0,
            incorrect: 0,
            updated_at_ms,
            word_builder: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> ProgressKey {
        ProgressKey::new(self.child_id.clone(), self.module)
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        is_completed(self.score, self.status, self.completion_flag)
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.correct.saturating_add(self.incorrect)
    }

    /// Drop per-play values for a write that is not a play.
    pub fn clear_play_counters(&mut self) {
        self.plays = 0;
        self.total_time_ms = 0;
        self.correct = 0;
        self.incorrect = 0;
        self.word_builder = None;
    }

    /// Fold in what an unsynced cache row still owes the remote store.
    ///
    /// Undelivered increments are added to this summary's. When this summary
    /// has no attempts of its own, the row's latest counts and breakdown are kept.
    pub fn absorb_pending(&mut self, earlier: &CachedProgress) {
        if earlier.synced {
            return;
        }
        self.plays = self.plays.saturating_add(earlier.pending_plays);
        self.total_time_ms = self.total_time_ms.saturating_add(earlier.pending_time_ms);
        if self.attempts() == 0 {
            self.correct = earlier.correct;
            self.incorrect = earlier.incorrect;
        }
        if self.word_builder.is_none() {
            self.word_builder = earlier.word_builder;
        }
    }
}

//
// ─── LOCAL CACHE ROW ───────────────────────────────────────────────────────────
//

/// Row of the on-device progress cache.
///
/// Keyed by the deterministic progress id so a re-save replaces the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedProgress {
    pub progress_id: String,
    pub parent_id: ParentId,
    pub child_id: ChildId,
    pub module: ModuleId,
    pub score: Score,
    pub status: ProgressStatus,
    pub stars: u32,
    pub time_spent_ms: u64,
    pub correct: u32,
    pub incorrect: u32,
    pub word_builder: Option<WordBuilderBreakdown>,
    /// Plays recorded locally but not yet added to the remote counter.
    pub pending_plays: u32,
    /// Play time recorded locally but not yet added to the remote counter.
    pub pending_time_ms: u64,
    pub updated_at_ms: i64,
    pub synced: bool,
}

impl CachedProgress {
    /// Unsynced cache row for a summary that is about to be pushed.
    #[must_use]
    pub fn from_summary(summary: &ProgressSummary) -> Self {
        Self {
            progress_id: summary.key().to_string(),
            parent_id: summary.parent_id.clone(),
            child_id: summary.child_id.clone(),
            module: summary.module,
            score: summary.score,
            status: if summary.is_completed() {
                ProgressStatus::Completed
            } else {
                summary.status
            },
            stars: summary.stars,
            time_spent_ms: summary.time_spent_ms,
            correct: summary.correct,
            incorrect: summary.incorrect,
            word_builder: summary.word_builder,
            pending_plays: summary.plays,
            pending_time_ms: summary.total_time_ms,
            updated_at_ms: summary.updated_at_ms,
            synced: false,
        }
    }

    /// Summary view of a cached row, used when re-pushing it.
    ///
    /// `plays` and `total_time_ms` hold only the undelivered increments, so a
    /// synced row pushes no counter changes.
    #[must_use]
    pub fn to_summary(&self) -> ProgressSummary {
        let mut summary = ProgressSummary::new(
            self.parent_id.clone(),
            self.child_id.clone(),
            self.module,
            self.updated_at_ms,
        );
        summary.score = self.score;
        summary.status = self.status;
        summary.stars = self.stars;
        summary.time_spent_ms = self.time_spent_ms;
        summary.correct = self.correct;
        summary.incorrect = self.incorrect;
        summary.word_builder = self.word_builder;
        summary.plays = self.pending_plays;
        summary.total_time_ms = self.pending_time_ms;
        summary
    }

    /// Flag the row as pushed and drop the increments it carried.
    pub fn mark_delivered(&mut self) {
        self.synced = true;
        self.pending_plays = 0;
        self.pending_time_ms = 0;
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        is_completed(self.score, self.status, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(score: u32) -> ProgressSummary {
        let mut s = ProgressSummary::new(
            ParentId::new("p").unwrap(),
            ChildId::new("c").unwrap(),
            ModuleId::MatchLetter,
            0,
        );
        s.score = Score::new(score);
        s
    }

    #[test]
    fn score_threshold_boundary() {
        assert!(!summary(69).is_completed());
        assert!(summary(70).is_completed());
    }

    #[test]
    fn any_completion_signal_suffices() {
        let mut by_status = summary(10);
        by_status.status = ProgressStatus::Completed;
        assert!(by_status.is_completed());

        let mut by_flag = summary(10);
        by_flag.completion_flag = true;
        assert!(by_flag.is_completed());

        assert!(!summary(10).is_completed());
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!(ProgressStatus::parse_lenient("COMPLETED"), ProgressStatus::Completed);
        assert_eq!(ProgressStatus::parse_lenient("in_progress"), ProgressStatus::InProgress);
        assert_eq!(ProgressStatus::parse_lenient(""), ProgressStatus::InProgress);
    }

    #[test]
    fn cached_row_uses_deterministic_key_and_folds_completion() {
        let mut s = summary(40);
        s.completion_flag = true;
        s.plays = 3;
        let row = CachedProgress::from_summary(&s);
        assert_eq!(row.progress_id, "c_match_letter");
        assert_eq!(row.status, ProgressStatus::Completed);
        assert!(!row.synced);
        assert_eq!(row.pending_plays, 3);
        assert_eq!(row.to_summary().plays, 3);
    }

    #[test]
    fn delivered_rows_push_no_increments() {
        let mut s = summary(80);
        s.plays = 1;
        s.total_time_ms = 45_000;
        s.correct = 8;
        s.incorrect = 2;
        let mut row = CachedProgress::from_summary(&s);
        row.mark_delivered();

        let again = row.to_summary();
        assert!(row.synced);
        assert_eq!((again.plays, again.total_time_ms), (0, 0));
        assert_eq!((again.correct, again.incorrect), (8, 2));
    }

    #[test]
    fn unsynced_increments_accumulate() {
        let mut first = summary(80);
        first.plays = 1;
        first.total_time_ms = 45_000;
        first.correct = 8;
        first.incorrect = 2;
        let earlier = CachedProgress::from_summary(&first);

        let mut completion = summary(90);
        completion.absorb_pending(&earlier);
        assert_eq!((completion.plays, completion.total_time_ms), (1, 45_000));
        assert_eq!((completion.correct, completion.incorrect), (8, 2));

        let mut second = summary(50);
        second.plays = 1;
        second.total_time_ms = 10_000;
        second.correct = 5;
        second.incorrect = 5;
        second.absorb_pending(&earlier);
        assert_eq!((second.plays, second.total_time_ms), (2, 55_000));
        assert_eq!(second.correct, 5);

        let mut synced = earlier.clone();
        synced.mark_delivered();
        let mut third = summary(50);
        third.absorb_pending(&synced);
        assert_eq!(third.plays, 0);
    }

    #[test]
    fn score_saturates() {
        assert_eq!(Score::new(130).value(), 100);
        assert_eq!(Score::from_i64(-5).value(), 0);
    }
}
