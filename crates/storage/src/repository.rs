use async_trait::async_trait;
use buds_core::model::{
    AnalyticsRow, CachedProgress, ChildId, ChildProfile, GameSessionRecord, ModuleId, ParentId,
    SyncOperation, SyncQueueItem, SyncStatus, SyncTable,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// On-device cache of progress summaries with a synced flag.
#[async_trait]
pub trait ProgressCacheRepository: Send + Sync {
    /// Insert or replace a row keyed by its progress id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn upsert_progress(&self, row: &CachedProgress) -> Result<(), StorageError>;

    /// Fetch a cached row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_progress(&self, progress_id: &str) -> Result<CachedProgress, StorageError>;

    /// Rows that still need to be pushed, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or decode failures.
    async fn unsynced_progress(&self) -> Result<Vec<CachedProgress>, StorageError>;

    /// Flag a row as pushed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the row does not exist.
    async fn mark_progress_synced(&self, progress_id: &str) -> Result<(), StorageError>;

    /// Every cached row for a child, ordered by module id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or decode failures.
    async fn progress_for_child(&self, child: &ChildId) -> Result<Vec<CachedProgress>, StorageError>;
}

/// Queue of local writes waiting for a remote push.
#[async_trait]
pub trait SyncQueueRepository: Send + Sync {
    /// Queue a record for a later push. An unsynced item for the same record is reused,
    /// so a record has at most one live item; a failed item stays failed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the item cannot be stored.
    async fn enqueue(
        &self,
        table: SyncTable,
        record_id: &str,
        operation: SyncOperation,
        now_ms: i64,
    ) -> Result<i64, StorageError>;

    /// Pending items, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or decode failures.
    async fn pending(&self, limit: u32) -> Result<Vec<SyncQueueItem>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the item does not exist.
    async fn mark_synced(&self, id: i64) -> Result<(), StorageError>;

    /// Record a failed attempt. The item stays pending until `max_attempts` is reached, then
    /// parks as failed and is no longer returned by `pending`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the item does not exist.
    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        max_attempts: u32,
    ) -> Result<SyncStatus, StorageError>;

    /// Mark every pending or failed item for a record as synced; returns how many were cleared.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on write failures.
    async fn clear_record(&self, table: SyncTable, record_id: &str) -> Result<u64, StorageError>;
}

/// Local per-session log and cumulative analytics.
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Append the session and fold it into the analytics row atomically.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if either write fails; neither is kept in that case.
    async fn record_game_session(
        &self,
        record: &GameSessionRecord,
    ) -> Result<AnalyticsRow, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on query or decode failures.
    async fn analytics_for_child(&self, child: &ChildId) -> Result<Vec<AnalyticsRow>, StorageError>;

    /// Sessions for one module, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or decode failures.
    async fn sessions_for(
        &self,
        child: &ChildId,
        module: ModuleId,
        limit: u32,
    ) -> Result<Vec<GameSessionRecord>, StorageError>;

    /// Most played song; ties go to the one with more total time.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or decode failures.
    async fn favourite_song(&self, child: &ChildId) -> Result<Option<ModuleId>, StorageError>;
}

#[async_trait]
pub trait ChildProfileRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if another child already holds the slot.
    async fn upsert_child(&self, profile: &ChildProfile) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_child(&self, id: &ChildId) -> Result<ChildProfile, StorageError>;

    /// Active profiles of a parent, ordered by slot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query or decode failures.
    async fn children_for_parent(&self, parent: &ParentId)
    -> Result<Vec<ChildProfile>, StorageError>;
}

/// Favourite song rule shared by every backend.
pub(crate) fn pick_favourite_song<'a, I>(rows: I) -> Option<ModuleId>
where
    I: IntoIterator<Item = &'a AnalyticsRow>,
{
    rows.into_iter()
        .filter(|row| row.module.is_song() && row.session_count > 0)
        .max_by_key(|row| (row.session_count, row.total_time_ms))
        .map(|row| row.module)
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct QueueState {
    next_id: i64,
    items: Vec<SyncQueueItem>,
}

#[derive(Default)]
struct AnalyticsState {
    sessions: Vec<GameSessionRecord>,
    rows: HashMap<(ChildId, ModuleId), AnalyticsRow>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<String, CachedProgress>>>,
    queue: Arc<Mutex<QueueState>>,
    analytics: Arc<Mutex<AnalyticsState>>,
    children: Arc<Mutex<HashMap<ChildId, ChildProfile>>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    m.lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressCacheRepository for InMemoryRepository {
    async fn upsert_progress(&self, row: &CachedProgress) -> Result<(), StorageError> {
        lock(&self.progress)?.insert(row.progress_id.clone(), row.clone());
        Ok(())
    }

    async fn get_progress(&self, progress_id: &str) -> Result<CachedProgress, StorageError> {
        lock(&self.progress)?
            .get(progress_id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn unsynced_progress(&self) -> Result<Vec<CachedProgress>, StorageError> {
        let guard = lock(&self.progress)?;
        let mut rows: Vec<_> = guard.values().filter(|r| !r.synced).cloned().collect();
        rows.sort_by(|a, b| {
            a.updated_at_ms
                .cmp(&b.updated_at_ms)
                .then_with(|| a.progress_id.cmp(&b.progress_id))
        });
        Ok(rows)
    }

    async fn mark_progress_synced(&self, progress_id: &str) -> Result<(), StorageError> {
        let mut guard = lock(&self.progress)?;
        let row = guard.get_mut(progress_id).ok_or(StorageError::NotFound)?;
        row.mark_delivered();
        Ok(())
    }

    async fn progress_for_child(&self, child: &ChildId) -> Result<Vec<CachedProgress>, StorageError> {
        let guard = lock(&self.progress)?;
        let mut rows: Vec<_> = guard
            .values()
            .filter(|r| &r.child_id == child)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.module.as_str());
        Ok(rows)
    }
}

#[async_trait]
impl SyncQueueRepository for InMemoryRepository {
    async fn enqueue(
        &self,
        table: SyncTable,
        record_id: &str,
        operation: SyncOperation,
        now_ms: i64,
    ) -> Result<i64, StorageError> {
        let mut guard = lock(&self.queue)?;
        if let Some(existing) = guard.items.iter_mut().find(|item| {
            item.status != SyncStatus::Synced && item.table == table && item.record_id == record_id
        }) {
            existing.operation = operation;
            return Ok(existing.id);
        }
        guard.next_id += 1;
        let id = guard.next_id;
        guard.items.push(SyncQueueItem {
            id,
            table,
            record_id: record_id.to_owned(),
            operation,
            status: SyncStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at_ms: now_ms,
        });
        Ok(id)
    }

    async fn pending(&self, limit: u32) -> Result<Vec<SyncQueueItem>, StorageError> {
        let guard = lock(&self.queue)?;
        Ok(guard
            .items
            .iter()
            .filter(|item| item.status == SyncStatus::Pending)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_synced(&self, id: i64) -> Result<(), StorageError> {
        let mut guard = lock(&self.queue)?;
        let item = guard
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(StorageError::NotFound)?;
        item.status = SyncStatus::Synced;
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        max_attempts: u32,
    ) -> Result<SyncStatus, StorageError> {
        let mut guard = lock(&self.queue)?;
        let item = guard
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(StorageError::NotFound)?;
        item.attempts = item.attempts.saturating_add(1);
        item.last_error = Some(error.to_owned());
        if item.attempts >= max_attempts {
            item.status = SyncStatus::Failed;
        }
        Ok(item.status)
    }

    async fn clear_record(&self, table: SyncTable, record_id: &str) -> Result<u64, StorageError> {
        let mut guard = lock(&self.queue)?;
        let mut cleared = 0;
        for item in guard.items.iter_mut().filter(|item| {
            item.status != SyncStatus::Synced && item.table == table && item.record_id == record_id
        }) {
            item.status = SyncStatus::Synced;
            cleared += 1;
        }
        Ok(cleared)
    }
}

#[async_trait]
impl AnalyticsRepository for InMemoryRepository {
    async fn record_game_session(
        &self,
        record: &GameSessionRecord,
    ) -> Result<AnalyticsRow, StorageError> {
        let mut guard = lock(&self.analytics)?;
        guard.sessions.push(record.clone());
        let row = guard
            .rows
            .entry((record.child_id.clone(), record.module))
            .or_insert_with(|| AnalyticsRow::empty(record.child_id.clone(), record.module));
        row.apply(record);
        Ok(row.clone())
    }

    async fn analytics_for_child(&self, child: &ChildId) -> Result<Vec<AnalyticsRow>, StorageError> {
        let guard = lock(&self.analytics)?;
        let mut rows: Vec<_> = guard
            .rows
            .values()
            .filter(|row| &row.child_id == child)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.module.as_str());
        Ok(rows)
    }

    async fn sessions_for(
        &self,
        child: &ChildId,
        module: ModuleId,
        limit: u32,
    ) -> Result<Vec<GameSessionRecord>, StorageError> {
        let guard = lock(&self.analytics)?;
        Ok(guard
            .sessions
            .iter()
            .rev()
            .filter(|s| &s.child_id == child && s.module == module)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn favourite_song(&self, child: &ChildId) -> Result<Option<ModuleId>, StorageError> {
        let guard = lock(&self.analytics)?;
        Ok(pick_favourite_song(
            guard.rows.values().filter(|row| &row.child_id == child),
        ))
    }
}

#[async_trait]
impl ChildProfileRepository for InMemoryRepository {
    async fn upsert_child(&self, profile: &ChildProfile) -> Result<(), StorageError> {
        let mut guard = lock(&self.children)?;
        let slot_taken = guard.values().any(|other| {
            other.parent_id == profile.parent_id
                && other.slot == profile.slot
                && other.child_id != profile.child_id
        });
        if slot_taken {
            return Err(StorageError::Conflict);
        }
        guard.insert(profile.child_id.clone(), profile.clone());
        Ok(())
    }

    async fn get_child(&self, id: &ChildId) -> Result<ChildProfile, StorageError> {
        lock(&self.children)?
            .get(id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn children_for_parent(
        &self,
        parent: &ParentId,
    ) -> Result<Vec<ChildProfile>, StorageError> {
        let guard = lock(&self.children)?;
        let mut out: Vec<_> = guard
            .values()
            .filter(|c| &c.parent_id == parent && c.active)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.slot);
        Ok(out)
    }
}

/// Aggregates the local repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressCacheRepository>,
    pub sync_queue: Arc<dyn SyncQueueRepository>,
    pub analytics: Arc<dyn AnalyticsRepository>,
    pub children: Arc<dyn ChildProfileRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            progress: Arc::new(repo.clone()),
            sync_queue: Arc::new(repo.clone()),
            analytics: Arc::new(repo.clone()),
            children: Arc::new(repo),
        }
    }
}
