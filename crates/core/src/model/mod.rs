mod analytics;
mod child;
mod ids;
mod module;
mod progress;
mod scoring;
mod session;
mod sync;

pub use analytics::{AnalyticsRow, AnalyticsSample, GameSessionRecord, RemoteAnalytics};
pub use child::{
    ChildProfile, ChildProfileDraft, ChildProfileError, MAX_CHILD_AGE, MAX_CUSTOM_WORDS,
    MAX_NAME_WORDS, PLACEHOLDER_AVATAR,
};
pub use ids::{ChildId, IdError, ParentId, ProgressKey};
pub use module::{ModuleError, ModuleId, ModuleKind, ScoringPolicy};
pub use progress::{
    COMPLETION_SCORE_THRESHOLD, CachedProgress, ProgressStatus, ProgressSummary, Score,
    WordBuilderBreakdown, is_completed,
};
pub use scoring::{
    GALLERY_ANSWERS_PER_STAR, MEDIA_COMPLETION_FRACTION, POINTS_PER_HIT, RoundTally,
    ScoredSession, ScoringInput, accuracy_score, tiered_stars, watched_fraction,
};
pub use session::{EndTrigger, SessionOutcome};
pub use sync::{SyncOperation, SyncQueueItem, SyncStatus, SyncTable};

/// Number of fixed child profile slots per parent.
pub const MAX_CHILD_SLOTS: u8 = 5;
