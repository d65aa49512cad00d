use std::sync::Arc;

use buds_core::Clock;
use buds_core::model::{
    ChildId, ChildProfile, ChildProfileDraft, MAX_CHILD_SLOTS, ParentId, SyncOperation, SyncTable,
};
use storage::repository::{ChildProfileRepository, SyncQueueRepository};
use tracing::{info, warn};

use crate::error::ChildServiceError;
use crate::progress::SaveOutcome;
use crate::sync::SyncService;

/// Manages the five fixed child slots of a parent.
#[derive(Clone)]
pub struct ChildProfileService {
    clock: Clock,
    children: Arc<dyn ChildProfileRepository>,
    queue: Arc<dyn SyncQueueRepository>,
    sync: SyncService,
}

impl ChildProfileService {
    #[must_use]
    pub fn new(
        clock: Clock,
        children: Arc<dyn ChildProfileRepository>,
        queue: Arc<dyn SyncQueueRepository>,
        sync: SyncService,
    ) -> Self {
        Self {
            clock,
            children,
            queue,
            sync,
        }
    }

    /// Fill every empty slot with a placeholder profile and return all slots.
    ///
    /// # Errors
    ///
    /// Returns `ChildServiceError::Storage` if the local store fails.
    pub async fn ensure_default_slots(
        &self,
        parent: &ParentId,
    ) -> Result<Vec<ChildProfile>, ChildServiceError> {
        let existing = self.children.children_for_parent(parent).await?;
        let now = self.clock.now_millis();
        let mut created = 0;
        for slot in 1..=MAX_CHILD_SLOTS {
            if existing.iter().any(|c| c.slot == slot) {
                continue;
            }
            let profile = ChildProfile::placeholder(parent, slot, now)?;
            self.children.upsert_child(&profile).await?;
            created += 1;
        }
        if created > 0 {
            info!(%parent, created, "created placeholder child slots");
        }
        Ok(self.children.children_for_parent(parent).await?)
    }

    /// # Errors
    ///
    /// Returns `ChildServiceError::Storage` if the local store fails.
    pub async fn list_children(
        &self,
        parent: &ParentId,
    ) -> Result<Vec<ChildProfile>, ChildServiceError> {
        Ok(self.children.children_for_parent(parent).await?)
    }

    /// Validate and apply an edit. Rollup fields are untouched.
    ///
    /// # Errors
    ///
    /// Returns `ChildServiceError::Profile` for an invalid draft and
    /// `ChildServiceError::Storage` if the child does not exist.
    pub async fn update_profile(
        &self,
        child: &ChildId,
        draft: ChildProfileDraft,
    ) -> Result<ChildProfile, ChildServiceError> {
        let draft = draft.validate()?;
        let mut profile = self.children.get_child(child).await?;
        profile.apply_draft(draft, self.clock.now_millis());
        self.children.upsert_child(&profile).await?;
        info!(%child, "child profile updated");
        Ok(profile)
    }

    /// Restore placeholder values. Profiles are never deleted.
    ///
    /// # Errors
    ///
    /// Returns `ChildServiceError::Storage` if the child does not exist.
    pub async fn reset_slot(&self, child: &ChildId) -> Result<ChildProfile, ChildServiceError> {
        let mut profile = self.children.get_child(child).await?;
        profile.reset(self.clock.now_millis());
        self.children.upsert_child(&profile).await?;
        info!(%child, slot = profile.slot, "child slot reset");
        Ok(profile)
    }

    /// Push the profile to `child_profiles`, queueing a retry when the remote store fails.
    ///
    /// # Errors
    ///
    /// Returns `ChildServiceError::Storage` if the profile cannot be read or the
    /// retry cannot be queued.
    pub async fn publish(&self, child: &ChildId) -> Result<SaveOutcome, ChildServiceError> {
        let profile = self.children.get_child(child).await?;
        match self.sync.publish_profile(&profile).await {
            Ok(_) => Ok(SaveOutcome::Synced),
            Err(err) => {
                warn!(%child, %err, "profile publish failed; queued for retry");
                self.queue
                    .enqueue(
                        SyncTable::ChildProfiles,
                        child.as_str(),
                        SyncOperation::Upsert,
                        self.clock.now_millis(),
                    )
                    .await?;
                Ok(SaveOutcome::SavedLocally)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buds_core::model::ChildProfileError;
    use buds_core::time::fixed_clock;
    use storage::remote::{DocumentStore, InMemoryDocumentStore, collections};
    use storage::repository::{InMemoryRepository, StorageError};

    fn service(store: &InMemoryDocumentStore) -> (ChildProfileService, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let sync = SyncService::new(fixed_clock(), Arc::new(store.clone()));
        let service = ChildProfileService::new(fixed_clock(), repo.clone(), repo.clone(), sync);
        (service, repo)
    }

    fn draft(name: &str, age: u8, words: &[&str]) -> ChildProfileDraft {
        ChildProfileDraft {
            name: name.into(),
            age,
            words: words.iter().map(|w| (*w).to_owned()).collect(),
            ..ChildProfileDraft::default()
        }
    }

    #[tokio::test]
    async fn default_slots_are_created_once() {
        let store = InMemoryDocumentStore::new();
        let (service, _) = service(&store);
        let parent = ParentId::new("p1").unwrap();

        let first = service.ensure_default_slots(&parent).await.unwrap();
        assert_eq!(first.len(), 5);
        assert_eq!(first[0].name, "Child 1");

        let again = service.ensure_default_slots(&parent).await.unwrap();
        assert_eq!(again, first);
    }

    #[tokio::test]
    async fn edits_are_validated_and_resettable() {
        let store = InMemoryDocumentStore::new();
        let (service, _) = service(&store);
        let parent = ParentId::new("p1").unwrap();
        service.ensure_default_slots(&parent).await.unwrap();
        let child = ChildId::for_slot(&parent, 2).unwrap();

        let err = service
            .update_profile(&child, draft("Mia", 11, &[]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChildServiceError::Profile(ChildProfileError::InvalidAge(11))
        ));

        let updated = service
            .update_profile(&child, draft("Mia", 4, &["mama", "dada"]))
            .await
            .unwrap();
        assert_eq!(updated.words.len(), 2);
        assert!(!updated.is_placeholder());

        let reset = service.reset_slot(&child).await.unwrap();
        assert_eq!(reset.name, "Child 2");
        assert!(reset.is_placeholder());

        let ghost = ChildId::new("ghost").unwrap();
        assert!(matches!(
            service.reset_slot(&ghost).await,
            Err(ChildServiceError::Storage(StorageError::NotFound))
        ));
    }

    #[tokio::test]
    async fn publish_queues_when_offline() {
        let store = InMemoryDocumentStore::new();
        let (service, repo) = service(&store);
        let parent = ParentId::new("p1").unwrap();
        service.ensure_default_slots(&parent).await.unwrap();
        let child = ChildId::for_slot(&parent, 1).unwrap();

        store.set_offline(true);
        assert_eq!(service.publish(&child).await.unwrap(), SaveOutcome::SavedLocally);
        let pending = repo.pending(10).await.unwrap();
        assert_eq!(pending[0].table, SyncTable::ChildProfiles);

        store.set_offline(false);
        assert_eq!(service.publish(&child).await.unwrap(), SaveOutcome::Synced);
        let doc = store
            .get(collections::CHILD_PROFILES, child.as_str())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.get_u64("slot"), Some(1));
    }
}
