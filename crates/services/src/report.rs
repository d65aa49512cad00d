//! Parent-facing report view-models. Rendering is left to the caller.

use std::sync::Arc;

use buds_core::Rollup;
use buds_core::model::{ChildId, ModuleId, ParentId, ProgressSummary};
use serde::Serialize;
use storage::repository::{AnalyticsRepository, ChildProfileRepository};

use crate::error::ReportError;
use crate::sync::SyncService;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleReport {
    pub module: ModuleId,
    pub display_name: &'static str,
    pub sessions: u32,
    pub average_score: f64,
    pub best_score: u32,
    pub last_score: u32,
    pub accuracy: f64,
    pub total_time_ms: u64,
}

/// Single-child report built from local analytics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildReport {
    pub child_id: ChildId,
    pub modules: Vec<ModuleReport>,
    pub average_score: f64,
    pub overall_accuracy: f64,
    pub favourite_song: Option<ModuleId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildOverview {
    pub child_id: ChildId,
    pub name: String,
    pub stars: u32,
    pub progress_percent: u32,
    pub completed_modules: u32,
    pub plays: u32,
    pub time_spent_ms: u64,
}

/// Dashboard rows for every active child of a parent, from remote summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentOverview {
    pub parent_id: ParentId,
    pub children: Vec<ChildOverview>,
}

#[derive(Clone)]
pub struct ReportService {
    analytics: Arc<dyn AnalyticsRepository>,
    children: Arc<dyn ChildProfileRepository>,
    sync: SyncService,
    total_modules: u32,
}

impl ReportService {
    #[must_use]
    pub fn new(
        analytics: Arc<dyn AnalyticsRepository>,
        children: Arc<dyn ChildProfileRepository>,
        sync: SyncService,
        total_modules: u32,
    ) -> Self {
        Self {
            analytics,
            children,
            sync,
            total_modules,
        }
    }

    /// # Errors
    ///
    /// Returns `ReportError::Storage` if local analytics cannot be read.
    #[allow(clippy::cast_precision_loss)]
    pub async fn child_report(&self, child: &ChildId) -> Result<ChildReport, ReportError> {
        let rows = self.analytics.analytics_for_child(child).await?;
        let favourite_song = self.analytics.favourite_song(child).await?;

        let sessions: u64 = rows.iter().map(|r| u64::from(r.session_count)).sum();
        let score: u64 = rows.iter().map(|r| r.total_score).sum();
        let correct: u64 = rows.iter().map(|r| r.total_correct).sum();
        let attempts: u64 = rows.iter().map(|r| r.total_attempts).sum();

        let modules = rows
            .iter()
            .map(|r| ModuleReport {
                module: r.module,
                display_name: r.module.display_name(),
                sessions: r.session_count,
                average_score: r.average_score(),
                best_score: r.best_score.value(),
                last_score: r.last_score.value(),
                accuracy: r.accuracy(),
                total_time_ms: r.total_time_ms,
            })
            .collect();

        Ok(ChildReport {
            child_id: child.clone(),
            modules,
            average_score: if sessions == 0 { 0.0 } else { score as f64 / sessions as f64 },
            overall_accuracy: if attempts == 0 { 0.0 } else { correct as f64 / attempts as f64 },
            favourite_song,
        })
    }

    /// # Errors
    ///
    /// Returns `ReportError::Sync` if the remote summaries cannot be queried.
    pub async fn parent_overview(&self, parent: &ParentId) -> Result<ParentOverview, ReportError> {
        let profiles = self.children.children_for_parent(parent).await?;
        let summaries = self.sync.query_summaries(parent, None).await?;

        let children = profiles
            .into_iter()
            .map(|profile| {
                let mine: Vec<&ProgressSummary> = summaries
                    .iter()
                    .filter(|s| s.child_id == profile.child_id)
                    .collect();
                let rollup = Rollup::from_summaries(mine.iter().copied(), self.total_modules);
                ChildOverview {
                    child_id: profile.child_id,
                    name: profile.name,
                    stars: mine.iter().map(|s| s.stars).sum(),
                    progress_percent: rollup.progress_percent,
                    completed_modules: rollup.completed_modules,
                    plays: mine.iter().map(|s| s.plays).sum(),
                    time_spent_ms: mine.iter().map(|s| s.total_time_ms).sum(),
                }
            })
            .collect();

        Ok(ParentOverview {
            parent_id: parent.clone(),
            children,
        })
    }
}
