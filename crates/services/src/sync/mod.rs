//! Pushes local progress to the remote document store and reads it back.

use std::sync::Arc;

use buds_core::Clock;
use buds_core::model::{
    CachedProgress, ChildId, ChildProfile, ModuleId, ParentId, ProgressKey, ProgressSummary,
    RemoteAnalytics,
};
use storage::remote::{DocumentStore, Filter, WriteMode, collections};
use tracing::{debug, info};

use crate::error::SyncError;

pub mod documents;
mod drain;

pub use drain::{DrainReport, SyncDrain, spawn_sync_worker};

/// Writes summaries, analytics and profiles to the remote store.
#[derive(Clone)]
pub struct SyncService {
    clock: Clock,
    store: Arc<dyn DocumentStore>,
}

impl SyncService {
    #[must_use]
    pub fn new(clock: Clock, store: Arc<dyn DocumentStore>) -> Self {
        Self { clock, store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Merge a session summary into its `{child}_{module}` document.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the store rejects the write.
    pub async fn push_summary(&self, summary: &ProgressSummary) -> Result<u64, SyncError> {
        let key = summary.key().to_string();
        let write = documents::summary_write(summary);
        let version = self
            .store
            .set(collections::CHILD_PROGRESS, &key, &write, WriteMode::Merge)
            .await?;
        debug!(%key, version, score = summary.score.value(), "pushed progress");
        Ok(version)
    }

    /// Merge a summary into a document that must already exist.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote`, with `RemoteError::NotFound` when the document is gone.
    pub async fn update_summary(&self, summary: &ProgressSummary) -> Result<u64, SyncError> {
        let key = summary.key().to_string();
        let write = documents::summary_write(summary);
        let version = self
            .store
            .update(collections::CHILD_PROGRESS, &key, &write)
            .await?;
        debug!(%key, version, score = summary.score.value(), "updated progress");
        Ok(version)
    }

    /// Re-push a cached row along with the play increments it still owes.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the store rejects the write.
    pub async fn push_cached(&self, row: &CachedProgress) -> Result<u64, SyncError> {
        self.push_summary(&row.to_summary()).await
    }

    /// Recompute the analytics document for one child and module from the
    /// progress documents and replace it.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the query or the write fails.
    pub async fn refresh_analytics(
        &self,
        child: &ChildId,
        module: ModuleId,
    ) -> Result<RemoteAnalytics, SyncError> {
        let docs = self
            .store
            .query(
                collections::CHILD_PROGRESS,
                &[
                    Filter::eq(documents::CHILD_ID, child.as_str()),
                    Filter::eq(documents::MODULE_ID, module.as_str()),
                ],
            )
            .await?;
        let samples: Vec<_> = docs.iter().map(documents::analytics_sample).collect();
        let analytics = RemoteAnalytics::aggregate(&samples);

        let id = format!("{child}_{module}");
        let write = documents::analytics_write(child, module, &analytics, self.clock.now_millis());
        self.store
            .set(collections::CHILD_ANALYTICS, &id, &write, WriteMode::Replace)
            .await?;
        debug!(%id, sessions = analytics.session_count, "refreshed analytics");
        Ok(analytics)
    }

    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the store cannot be read.
    pub async fn fetch_summary(&self, key: &ProgressKey) -> Result<Option<ProgressSummary>, SyncError> {
        let doc = self
            .store
            .get(collections::CHILD_PROGRESS, &key.to_string())
            .await?;
        Ok(doc.as_ref().and_then(documents::summary_from_document))
    }

    /// Every readable summary for a parent, optionally narrowed to one child.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the query fails.
    pub async fn query_summaries(
        &self,
        parent: &ParentId,
        child: Option<&ChildId>,
    ) -> Result<Vec<ProgressSummary>, SyncError> {
        let mut filters = vec![Filter::eq(documents::PARENT_ID, parent.as_str())];
        if let Some(child) = child {
            filters.push(Filter::eq(documents::CHILD_ID, child.as_str()));
        }
        let docs = self
            .store
            .query(collections::CHILD_PROGRESS, &filters)
            .await?;
        Ok(docs
            .iter()
            .filter_map(documents::summary_from_document)
            .collect())
    }

    /// Every readable summary for one child, across parents and devices.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the query fails.
    pub async fn summaries_for_child(&self, child: &ChildId) -> Result<Vec<ProgressSummary>, SyncError> {
        let docs = self
            .store
            .query(
                collections::CHILD_PROGRESS,
                &[Filter::eq(documents::CHILD_ID, child.as_str())],
            )
            .await?;
        Ok(docs
            .iter()
            .filter_map(documents::summary_from_document)
            .collect())
    }

    /// Publish the editable profile fields. Rollup fields are never written here.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the store rejects the write.
    pub async fn publish_profile(&self, profile: &ChildProfile) -> Result<u64, SyncError> {
        let write = documents::profile_write(profile);
        let version = self
            .store
            .set(
                collections::CHILD_PROFILES,
                profile.child_id.as_str(),
                &write,
                WriteMode::Merge,
            )
            .await?;
        info!(child = %profile.child_id, version, "published child profile");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buds_core::model::{ProgressStatus, Score};
    use buds_core::time::fixed_clock;
    use storage::remote::{InMemoryDocumentStore, RemoteError};

    fn summary(child: &str, module: ModuleId, score: u32) -> ProgressSummary {
        let mut s = ProgressSummary::new(
            ParentId::new("p1").unwrap(),
            ChildId::new(child).unwrap(),
            module,
            1_000,
        );
        s.score = Score::new(score);
        s.status = ProgressStatus::from_score(s.score);
        s.plays = 1;
        s.time_spent_ms = 30_000;
        s.total_time_ms = 30_000;
        s.correct = 8;
        s.incorrect = 2;
        s
    }

    #[tokio::test]
    async fn repeated_pushes_share_one_document() {
        let store = InMemoryDocumentStore::new();
        let sync = SyncService::new(fixed_clock(), Arc::new(store.clone()));
        sync.push_summary(&summary("kid", ModuleId::FeedMonster, 40)).await.unwrap();
        sync.push_summary(&summary("kid", ModuleId::FeedMonster, 90)).await.unwrap();

        assert_eq!(store.len(collections::CHILD_PROGRESS), 1);
        let key = ProgressKey::new(ChildId::new("kid").unwrap(), ModuleId::FeedMonster);
        let back = sync.fetch_summary(&key).await.unwrap().unwrap();
        assert_eq!(back.score.value(), 90);
        assert_eq!(back.plays, 2);
        assert_eq!(back.total_time_ms, 60_000);
    }

    #[tokio::test]
    async fn update_only_touches_existing_documents() {
        let store = InMemoryDocumentStore::new();
        let sync = SyncService::new(fixed_clock(), Arc::new(store.clone()));
        let err = sync
            .update_summary(&summary("kid", ModuleId::MemoryMatch, 50))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Remote(RemoteError::NotFound)));
        assert_eq!(store.len(collections::CHILD_PROGRESS), 0);

        sync.push_summary(&summary("kid", ModuleId::MemoryMatch, 50)).await.unwrap();
        let mut percentage = summary("kid", ModuleId::MemoryMatch, 75);
        percentage.clear_play_counters();
        sync.update_summary(&percentage).await.unwrap();

        let key = ProgressKey::new(ChildId::new("kid").unwrap(), ModuleId::MemoryMatch);
        let back = sync.fetch_summary(&key).await.unwrap().unwrap();
        assert_eq!(back.score.value(), 75);
        assert_eq!(back.plays, 1);
        assert_eq!(back.correct, 8);
    }

    #[tokio::test]
    async fn analytics_are_replaced_from_progress_documents() {
        let store = InMemoryDocumentStore::new();
        let sync = SyncService::new(fixed_clock(), Arc::new(store.clone()));
        sync.push_summary(&summary("kid", ModuleId::MatchLetter, 80)).await.unwrap();
        sync.push_summary(&summary("other", ModuleId::MatchLetter, 20)).await.unwrap();

        let child = ChildId::new("kid").unwrap();
        let analytics = sync.refresh_analytics(&child, ModuleId::MatchLetter).await.unwrap();
        assert_eq!(analytics.session_count, 1);
        assert_eq!(analytics.total_attempts, 10);
        assert!((analytics.accuracy - 0.8).abs() < f64::EPSILON);
        assert_eq!(store.len(collections::CHILD_ANALYTICS), 1);
    }

    #[tokio::test]
    async fn query_narrows_to_child() {
        let store = InMemoryDocumentStore::new();
        let sync = SyncService::new(fixed_clock(), Arc::new(store));
        sync.push_summary(&summary("kid", ModuleId::AbcSong, 100)).await.unwrap();
        sync.push_summary(&summary("kid", ModuleId::FeedMonster, 10)).await.unwrap();
        sync.push_summary(&summary("other", ModuleId::AbcSong, 100)).await.unwrap();

        let parent = ParentId::new("p1").unwrap();
        assert_eq!(sync.query_summaries(&parent, None).await.unwrap().len(), 3);
        let kid = ChildId::new("kid").unwrap();
        assert_eq!(sync.query_summaries(&parent, Some(&kid)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn profile_publish_leaves_rollup_fields_alone() {
        let store = InMemoryDocumentStore::new();
        let sync = SyncService::new(fixed_clock(), Arc::new(store.clone()));
        let parent = ParentId::new("p1").unwrap();
        let mut profile = ChildProfile::placeholder(&parent, 1, 0).unwrap();
        profile.stars = 4;
        sync.publish_profile(&profile).await.unwrap();

        let doc = store
            .get(collections::CHILD_PROFILES, profile.child_id.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.get_str("name"), Some("Child 1"));
        assert!(doc.get("stars").is_none());
    }
}
