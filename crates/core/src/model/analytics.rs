use serde::{Deserialize, Serialize};

use crate::model::{ChildId, ModuleId, Score};

/// One finished play of a module, as stored in the local session log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSessionRecord {
    pub child_id: ChildId,
    pub module: ModuleId,
    pub started_at_ms: i64,
    pub ended_at_ms: i64,
    pub score: Score,
    pub total_correct: u32,
    pub total_attempts: u32,
    pub stars: u32,
    pub completed: bool,
}

impl GameSessionRecord {
    /// Session length, clamped at zero when the clock went backwards.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.ended_at_ms.saturating_sub(self.started_at_ms)).unwrap_or(0)
    }

    #[must_use]
    pub fn accuracy(&self) -> f64 {
        ratio(u64::from(self.total_correct), u64::from(self.total_attempts))
    }
}

/// Cumulative local analytics for one (child, module) pair.
///
/// Rows only grow; they are never deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsRow {
    pub child_id: ChildId,
    pub module: ModuleId,
    pub session_count: u32,
    pub total_score: u64,
    pub total_correct: u64,
    pub total_attempts: u64,
    pub total_time_ms: u64,
    pub last_played_ms: i64,
    pub last_score: Score,
    pub last_accuracy: f64,
    pub last_session_time_ms: u64,
    pub best_score: Score,
}

impl AnalyticsRow {
    #[must_use]
    pub fn empty(child_id: ChildId, module: ModuleId) -> Self {
        Self {
            child_id,
            module,
            session_count: 0,
            total_score: 0,
            total_correct: 0,
            total_attempts: 0,
            total_time_ms: 0,
            last_played_ms: 0,
            last_score: Score::default(),
            last_accuracy: 0.0,
            last_session_time_ms: 0,
            best_score: Score::default(),
        }
    }

    /// Fold one finished session into the running totals.
    pub fn apply(&mut self, record: &GameSessionRecord) {
        let duration = record.duration_ms();
        self.session_count = self.session_count.saturating_add(1);
        self.total_score = self.total_score.saturating_add(u64::from(record.score.value()));
        self.total_correct = self
            .total_correct
            .saturating_add(u64::from(record.total_correct));
        self.total_attempts = self
            .total_attempts
            .saturating_add(u64::from(record.total_attempts));
        self.total_time_ms = self.total_time_ms.saturating_add(duration);
        self.last_played_ms = record.ended_at_ms;
        self.last_score = record.score;
        self.last_accuracy = record.accuracy();
        self.last_session_time_ms = duration;
        self.best_score = self.best_score.max(record.score);
    }

    #[must_use]
    pub fn average_score(&self) -> f64 {
        ratio(self.total_score, u64::from(self.session_count))
    }

    #[must_use]
    pub fn accuracy(&self) -> f64 {
        ratio(self.total_correct, self.total_attempts)
    }
}

/// Per (child, module) rollup pushed to the remote analytics collection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAnalytics {
    pub session_count: u64,
    pub total_score: u64,
    pub total_correct: u64,
    pub total_attempts: u64,
    pub total_time_ms: u64,
    pub avg_score: f64,
    pub accuracy: f64,
    pub avg_time_ms: f64,
}

/// Per-document inputs for [`RemoteAnalytics::aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnalyticsSample {
    pub score: Option<u64>,
    pub correct: Option<u64>,
    pub incorrect: Option<u64>,
    pub time_spent_ms: Option<u64>,
}

impl RemoteAnalytics {
    /// Aggregate progress documents for one child and module.
    ///
    /// Attempts are only counted for documents that carry correct or incorrect counts.
    #[must_use]
    pub fn aggregate(samples: &[AnalyticsSample]) -> Self {
        let mut out = Self {
            session_count: samples.len() as u64,
            ..Self::default()
        };
        for sample in samples {
            out.total_score += sample.score.unwrap_or(0);
            out.total_correct += sample.correct.unwrap_or(0);
            if sample.correct.is_some() || sample.incorrect.is_some() {
                out.total_attempts += sample.correct.unwrap_or(0) + sample.incorrect.unwrap_or(0);
            }
            out.total_time_ms += sample.time_spent_ms.unwrap_or(0);
        }
        out.avg_score = ratio(out.total_score, out.session_count);
        out.accuracy = ratio(out.total_correct, out.total_attempts);
        out.avg_time_ms = ratio(out.total_time_ms, out.session_count);
        out
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(score: u32, correct: u32, attempts: u32, start: i64, end: i64) -> GameSessionRecord {
        GameSessionRecord {
            child_id: ChildId::new("c").unwrap(),
            module: ModuleId::WordBuilder,
            started_at_ms: start,
            ended_at_ms: end,
            score: Score::new(score),
            total_correct: correct,
            total_attempts: attempts,
            stars: 0,
            completed: true,
        }
    }

    #[test]
    fn folding_keeps_best_and_replaces_last() {
        let mut row = AnalyticsRow::empty(ChildId::new("c").unwrap(), ModuleId::WordBuilder);
        row.apply(&record(80, 8, 10, 0, 45_000));
        row.apply(&record(40, 2, 5, 50_000, 60_000));

        assert_eq!(row.session_count, 2);
        assert_eq!(row.total_score, 120);
        assert_eq!(row.total_correct, 10);
        assert_eq!(row.total_attempts, 15);
        assert_eq!(row.total_time_ms, 55_000);
        assert_eq!(row.best_score.value(), 80);
        assert_eq!(row.last_score.value(), 40);
        assert_eq!(row.last_session_time_ms, 10_000);
        assert!((row.last_accuracy - 0.4).abs() < f64::EPSILON);
        assert_eq!(row.last_played_ms, 60_000);
    }

    #[test]
    fn negative_duration_is_clamped() {
        let r = record(10, 0, 0, 5_000, 1_000);
        assert_eq!(r.duration_ms(), 0);
        assert_eq!(r.accuracy(), 0.0);
    }

    #[test]
    fn remote_aggregate_only_counts_attempts_when_present() {
        let samples = [
            AnalyticsSample {
                score: Some(80),
                correct: Some(8),
                incorrect: Some(2),
                time_spent_ms: Some(45_000),
            },
            AnalyticsSample {
                score: Some(100),
                correct: None,
                incorrect: None,
                time_spent_ms: Some(15_000),
            },
        ];
        let agg = RemoteAnalytics::aggregate(&samples);
        assert_eq!(agg.session_count, 2);
        assert_eq!(agg.total_attempts, 10);
        assert!((agg.avg_score - 90.0).abs() < f64::EPSILON);
        assert!((agg.accuracy - 0.8).abs() < f64::EPSILON);
        assert!((agg.avg_time_ms - 30_000.0).abs() < f64::EPSILON);
    }
}
