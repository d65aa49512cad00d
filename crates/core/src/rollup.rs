use std::collections::BTreeSet;

use crate::model::ProgressSummary;

/// Number of modules that count towards a child's overall progress.
pub const DEFAULT_TOTAL_MODULES: u32 = 7;
/// Star rating scale used on child profiles.
pub const MAX_PROFILE_STARS: u32 = 5;

/// A child's overall progress, derived from per-module summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rollup {
    pub completed_modules: u32,
    pub total_modules: u32,
    pub progress_percent: u32,
    pub stars: u32,
}

impl Rollup {
    /// Progress = `min(1, completed / total) * 100`, stars = the same ratio on a five
    /// star scale. Both rounded half away from zero.
    #[must_use]
    pub fn from_completed(completed_modules: u32, total_modules: u32) -> Self {
        if total_modules == 0 {
            return Self::default();
        }
        let ratio = (f64::from(completed_modules) / f64::from(total_modules)).min(1.0);
        Self {
            completed_modules,
            total_modules,
            progress_percent: round_u32(ratio * 100.0),
            stars: round_u32(ratio * f64::from(MAX_PROFILE_STARS)),
        }
    }

    /// Counts each completed module once, however many summaries mention it.
    #[must_use]
    pub fn from_summaries<'a, I>(summaries: I, total_modules: u32) -> Self
    where
        I: IntoIterator<Item = &'a ProgressSummary>,
    {
        let completed: BTreeSet<_> = summaries
            .into_iter()
            .filter(|s| s.is_completed())
            .map(|s| s.module)
            .collect();
        let count = u32::try_from(completed.len()).unwrap_or(u32::MAX);
        Self::from_completed(count, total_modules)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_u32(value: f64) -> u32 {
    value.round().max(0.0) as u32
}
