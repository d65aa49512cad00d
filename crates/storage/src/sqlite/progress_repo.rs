use buds_core::model::{CachedProgress, ChildId};

use super::SqliteRepository;
use super::mapping::{conn, i64_from_u64, map_progress_row, ser};
use crate::repository::{ProgressCacheRepository, StorageError};

const SELECT_PROGRESS: &str = r"
    SELECT
        progress_id, parent_id, child_id, module_id, score, status,
        stars, time_spent, correct, incorrect, word_builder,
        pending_plays, pending_time_ms, timestamp, sync_status
    FROM child_progress
";

#[async_trait::async_trait]
impl ProgressCacheRepository for SqliteRepository {
    async fn upsert_progress(&self, row: &CachedProgress) -> Result<(), StorageError> {
        let word_builder = row
            .word_builder
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(ser)?;
        sqlx::query(
            r"
                INSERT INTO child_progress (
                    progress_id, parent_id, child_id, module_id, score, status,
                    stars, time_spent, correct, incorrect, word_builder,
                    pending_plays, pending_time_ms, timestamp, sync_status
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                ON CONFLICT(progress_id) DO UPDATE SET
                    parent_id = excluded.parent_id,
                    child_id = excluded.child_id,
                    module_id = excluded.module_id,
                    score = excluded.score,
                    status = excluded.status,
                    stars = excluded.stars,
                    time_spent = excluded.time_spent,
                    correct = excluded.correct,
                    incorrect = excluded.incorrect,
                    word_builder = excluded.word_builder,
                    pending_plays = excluded.pending_plays,
                    pending_time_ms = excluded.pending_time_ms,
                    timestamp = excluded.timestamp,
                    sync_status = excluded.sync_status
            ",
        )
        .bind(&row.progress_id)
        .bind(row.parent_id.as_str())
        .bind(row.child_id.as_str())
        .bind(row.module.as_str())
        .bind(i64::from(row.score.value()))
        .bind(row.status.as_str())
        .bind(i64::from(row.stars))
        .bind(i64_from_u64("time_spent", row.time_spent_ms)?)
        .bind(i64::from(row.correct))
        .bind(i64::from(row.incorrect))
        .bind(word_builder)
        .bind(i64::from(row.pending_plays))
        .bind(i64_from_u64("pending_time_ms", row.pending_time_ms)?)
        .bind(row.updated_at_ms)
        .bind(i64::from(row.synced))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn get_progress(&self, progress_id: &str) -> Result<CachedProgress, StorageError> {
        let sql = format!("{SELECT_PROGRESS} WHERE progress_id = ?1");
        let row = sqlx::query(&sql)
            .bind(progress_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        map_progress_row(&row)
    }

    async fn unsynced_progress(&self) -> Result<Vec<CachedProgress>, StorageError> {
        let sql = format!("{SELECT_PROGRESS} WHERE sync_status = 0 ORDER BY timestamp ASC, progress_id ASC");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_progress_row).collect()
    }

    async fn mark_progress_synced(&self, progress_id: &str) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                UPDATE child_progress
                SET sync_status = 1, pending_plays = 0, pending_time_ms = 0
                WHERE progress_id = ?1
            ",
        )
            .bind(progress_id)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn progress_for_child(&self, child: &ChildId) -> Result<Vec<CachedProgress>, StorageError> {
        let sql = format!("{SELECT_PROGRESS} WHERE child_id = ?1 ORDER BY module_id ASC");
        let rows = sqlx::query(&sql)
            .bind(child.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_progress_row).collect()
    }
}
