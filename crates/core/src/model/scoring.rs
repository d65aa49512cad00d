use crate::model::{Score, ScoringPolicy};

/// Points awarded per correct round by points-per-hit games.
pub const POINTS_PER_HIT: u32 = 10;
/// Correct answers needed per Family Gallery star.
pub const GALLERY_ANSWERS_PER_STAR: u32 = 3;
/// Share of a song that must be watched for it to count as completed.
pub const MEDIA_COMPLETION_FRACTION: f64 = 0.8;

/// Round-level counters accumulated while a module screen is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundTally {
    pub correct: u32,
    pub incorrect: u32,
    pub rounds: u32,
    pub all_photos_viewed: bool,
}

impl RoundTally {
    pub fn record_hit(&mut self) {
        self.correct = self.correct.saturating_add(1);
        self.rounds = self.rounds.saturating_add(1);
    }

    pub fn record_miss(&mut self) {
        self.incorrect = self.incorrect.saturating_add(1);
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.correct.saturating_add(self.incorrect)
    }
}

/// Inputs beyond the tally that some policies need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoringInput {
    pub elapsed_ms: u64,
    pub media_duration_ms: Option<u64>,
    pub supplied_score: Option<u32>,
}

/// Score, stars and local completion flag for one finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredSession {
    pub score: Score,
    pub stars: u32,
    pub completed: bool,
}

/// Tiered stars used by accuracy-scored modules.
#[must_use]
pub fn tiered_stars(score: Score) -> u32 {
    match score.value() {
        90.. => 3,
        60..=89 => 2,
        1..=59 => 1,
        0 => 0,
    }
}

/// Rounded accuracy percentage; zero when nothing was attempted.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn accuracy_score(correct: u32, attempts: u32) -> Score {
    if attempts == 0 {
        return Score::new(0);
    }
    let pct = (f64::from(correct) * 100.0 / f64::from(attempts)).round();
    Score::new(pct as u32)
}

/// Share of media watched; zero when the duration is unknown.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn watched_fraction(elapsed_ms: u64, media_duration_ms: Option<u64>) -> f64 {
    match media_duration_ms {
        Some(duration) if duration > 0 => elapsed_ms as f64 / duration as f64,
        _ => 0.0,
    }
}

impl ScoringPolicy {
    /// Apply this policy to a finished session.
    #[must_use]
    pub fn evaluate(self, tally: &RoundTally, input: &ScoringInput) -> ScoredSession {
        match self {
            ScoringPolicy::PointsPerHit => ScoredSession {
                score: Score::new(tally.correct.saturating_mul(POINTS_PER_HIT)),
                stars: tally.correct,
                completed: tally.rounds > 0,
            },
            ScoringPolicy::Accuracy => {
                let score = accuracy_score(tally.correct, tally.attempts());
                ScoredSession {
                    score,
                    stars: tiered_stars(score),
                    completed: tally.attempts() > 0,
                }
            }
            ScoringPolicy::Gallery => {
                let bonus = u32::from(tally.all_photos_viewed);
                let stars = tally.correct / GALLERY_ANSWERS_PER_STAR + bonus;
                ScoredSession {
                    score: Score::new(stars.saturating_mul(POINTS_PER_HIT)),
                    stars,
                    completed: tally.rounds > 0,
                }
            }
            ScoringPolicy::Media => {
                let completed = watched_fraction(input.elapsed_ms, input.media_duration_ms)
                    >= MEDIA_COMPLETION_FRACTION;
                ScoredSession {
                    score: Score::new(if completed { 100 } else { 50 }),
                    stars: u32::from(completed),
                    completed,
                }
            }
            ScoringPolicy::Completion => {
                let score = Score::new(input.supplied_score.unwrap_or(Score::MAX));
                ScoredSession {
                    score,
                    stars: 0,
                    completed: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(correct: u32, incorrect: u32) -> RoundTally {
        let mut t = RoundTally::default();
        for _ in 0..correct {
            t.record_hit();
        }
        for _ in 0..incorrect {
            t.record_miss();
        }
        t
    }

    #[test]
    fn star_tiers() {
        assert_eq!(tiered_stars(Score::new(95)), 3);
        assert_eq!(tiered_stars(Score::new(90)), 3);
        assert_eq!(tiered_stars(Score::new(89)), 2);
        assert_eq!(tiered_stars(Score::new(60)), 2);
        assert_eq!(tiered_stars(Score::new(1)), 1);
        assert_eq!(tiered_stars(Score::new(0)), 0);
    }

    #[test]
    fn accuracy_policy_scores_eight_of_ten() {
        let scored = ScoringPolicy::Accuracy.evaluate(&tally(8, 2), &ScoringInput::default());
        assert_eq!(scored.score.value(), 80);
        assert_eq!(scored.stars, 2);
        assert!(scored.completed);
    }

    #[test]
    fn accuracy_without_attempts_is_zero() {
        let scored = ScoringPolicy::Accuracy.evaluate(&tally(0, 0), &ScoringInput::default());
        assert_eq!(scored.score.value(), 0);
        assert_eq!(scored.stars, 0);
        assert!(!scored.completed);
    }

    #[test]
    fn points_per_hit_saturates_score() {
        let scored = ScoringPolicy::PointsPerHit.evaluate(&tally(12, 1), &ScoringInput::default());
        assert_eq!(scored.score.value(), 100);
        assert_eq!(scored.stars, 12);
    }

    #[test]
    fn gallery_awards_bonus_star() {
        let mut t = tally(7, 0);
        t.all_photos_viewed = true;
        let scored = ScoringPolicy::Gallery.evaluate(&t, &ScoringInput::default());
        assert_eq!(scored.stars, 3);
        assert_eq!(scored.score.value(), 30);
    }

    #[test]
    fn media_completion_depends_on_fraction_watched() {
        let watched = ScoringInput {
            elapsed_ms: 80_000,
            media_duration_ms: Some(100_000),
            supplied_score: None,
        };
        let scored = ScoringPolicy::Media.evaluate(&RoundTally::default(), &watched);
        assert_eq!((scored.score.value(), scored.stars, scored.completed), (100, 1, true));

        let skipped = ScoringInput {
            elapsed_ms: 79_999,
            ..watched
        };
        let scored = ScoringPolicy::Media.evaluate(&RoundTally::default(), &skipped);
        assert_eq!((scored.score.value(), scored.stars, scored.completed), (50, 0, false));

        let unknown = ScoringInput {
            elapsed_ms: 80_000,
            media_duration_ms: None,
            supplied_score: None,
        };
        assert!(!ScoringPolicy::Media.evaluate(&RoundTally::default(), &unknown).completed);
    }
}
