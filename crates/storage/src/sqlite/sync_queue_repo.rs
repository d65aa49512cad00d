use buds_core::model::{SyncOperation, SyncQueueItem, SyncStatus, SyncTable};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, map_queue_row, ser};
use crate::repository::{StorageError, SyncQueueRepository};

#[async_trait::async_trait]
impl SyncQueueRepository for SqliteRepository {
    async fn enqueue(
        &self,
        table: SyncTable,
        record_id: &str,
        operation: SyncOperation,
        now_ms: i64,
    ) -> Result<i64, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let existing = sqlx::query(
            r"
                SELECT id FROM sync_queue
                WHERE table_name = ?1 AND record_id = ?2 AND status != 'synced'
                ORDER BY id ASC
                LIMIT 1
            ",
        )
        .bind(table.as_str())
        .bind(record_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?;

        let id = if let Some(row) = existing {
            let id: i64 = row.try_get("id").map_err(ser)?;
            sqlx::query("UPDATE sync_queue SET operation = ?1 WHERE id = ?2")
                .bind(operation.as_str())
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            id
        } else {
            sqlx::query(
                r"
                    INSERT INTO sync_queue (table_name, record_id, operation, status, attempts, created_at)
                    VALUES (?1, ?2, ?3, 'pending', 0, ?4)
                ",
            )
            .bind(table.as_str())
            .bind(record_id)
            .bind(operation.as_str())
            .bind(now_ms)
            .execute(&mut *tx)
            .await
            .map_err(conn)?
            .last_insert_rowid()
        };

        tx.commit().await.map_err(conn)?;
        Ok(id)
    }

    async fn pending(&self, limit: u32) -> Result<Vec<SyncQueueItem>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, table_name, record_id, operation, status, attempts, last_error, created_at
                FROM sync_queue
                WHERE status = 'pending'
                ORDER BY id ASC
                LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_queue_row).collect()
    }

    async fn mark_synced(&self, id: i64) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE sync_queue SET status = 'synced' WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: i64,
        error: &str,
        max_attempts: u32,
    ) -> Result<SyncStatus, StorageError> {
        let row = sqlx::query(
            r"
                UPDATE sync_queue
                SET attempts = attempts + 1,
                    last_error = ?2,
                    status = CASE WHEN attempts + 1 >= ?3 THEN 'failed' ELSE status END
                WHERE id = ?1
                RETURNING status
            ",
        )
        .bind(id)
        .bind(error)
        .bind(i64::from(max_attempts))
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;
        let status: String = row.try_get("status").map_err(ser)?;
        Ok(SyncStatus::parse_lenient(&status))
    }

    async fn clear_record(&self, table: SyncTable, record_id: &str) -> Result<u64, StorageError> {
        let res = sqlx::query(
            r"
                UPDATE sync_queue SET status = 'synced'
                WHERE table_name = ?1 AND record_id = ?2 AND status != 'synced'
            ",
        )
        .bind(table.as_str())
        .bind(record_id)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(res.rows_affected())
    }
}
