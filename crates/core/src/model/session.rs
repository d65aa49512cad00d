use crate::model::{
    ChildId, GameSessionRecord, ModuleId, ParentId, RoundTally, ScoredSession,
    WordBuilderBreakdown,
};

/// Lifecycle event that asked a session to end.
///
/// Several of these can fire for the same screen; only the first one counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndTrigger {
    Pause,
    Destroy,
    ExitButton,
    Finished,
}

impl EndTrigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EndTrigger::Pause => "pause",
            EndTrigger::Destroy => "destroy",
            EndTrigger::ExitButton => "exit_button",
            EndTrigger::Finished => "finished",
        }
    }
}

/// Everything known about one finished play session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub parent_id: ParentId,
    pub child_id: ChildId,
    pub module: ModuleId,
    pub started_at_ms: i64,
    pub ended_at_ms: i64,
    pub trigger: EndTrigger,
    pub tally: RoundTally,
    pub scored: ScoredSession,
    pub word_builder: Option<WordBuilderBreakdown>,
}

impl SessionOutcome {
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.ended_at_ms.saturating_sub(self.started_at_ms)).unwrap_or(0)
    }

    /// Row for the local session log.
    #[must_use]
    pub fn to_record(&self) -> GameSessionRecord {
        GameSessionRecord {
            child_id: self.child_id.clone(),
            module: self.module,
            started_at_ms: self.started_at_ms,
            ended_at_ms: self.ended_at_ms,
            score: self.scored.score,
            total_correct: self.tally.correct,
            total_attempts: self.tally.attempts(),
            stars: self.scored.stars,
            completed: self.scored.completed,
        }
    }
}
