use buds_core::model::{AnalyticsRow, ChildId, GameSessionRecord, ModuleId};
use tracing::debug;

use super::SqliteRepository;
use super::mapping::{conn, i64_from_u64, map_analytics_row, map_session_row};
use crate::repository::{AnalyticsRepository, StorageError, pick_favourite_song};

const SELECT_ANALYTICS: &str = r"
    SELECT
        child_id, module_id, session_count, total_score, total_correct, total_attempts,
        total_time_ms, last_played, last_score, last_accuracy, last_session_time_ms, best_score
    FROM child_analytics
";

#[async_trait::async_trait]
impl AnalyticsRepository for SqliteRepository {
    async fn record_game_session(
        &self,
        record: &GameSessionRecord,
    ) -> Result<AnalyticsRow, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO game_sessions (
                    child_id, module_id, started_at, ended_at, duration_ms,
                    score, total_correct, total_attempts, stars, completed
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(record.child_id.as_str())
        .bind(record.module.as_str())
        .bind(record.started_at_ms)
        .bind(record.ended_at_ms)
        .bind(i64_from_u64("duration_ms", record.duration_ms())?)
        .bind(i64::from(record.score.value()))
        .bind(i64::from(record.total_correct))
        .bind(i64::from(record.total_attempts))
        .bind(i64::from(record.stars))
        .bind(i64::from(record.completed))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        let sql = format!("{SELECT_ANALYTICS} WHERE child_id = ?1 AND module_id = ?2");
        let existing = sqlx::query(&sql)
            .bind(record.child_id.as_str())
            .bind(record.module.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
        let mut row = match existing {
            Some(r) => map_analytics_row(&r)?,
            None => AnalyticsRow::empty(record.child_id.clone(), record.module),
        };
        row.apply(record);

        sqlx::query(
            r"
                INSERT INTO child_analytics (
                    child_id, module_id, session_count, total_score, total_correct,
                    total_attempts, total_time_ms, last_played, last_score, last_accuracy,
                    last_session_time_ms, best_score
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(child_id, module_id) DO UPDATE SET
                    session_count = excluded.session_count,
                    total_score = excluded.total_score,
                    total_correct = excluded.total_correct,
                    total_attempts = excluded.total_attempts,
                    total_time_ms = excluded.total_time_ms,
                    last_played = excluded.last_played,
                    last_score = excluded.last_score,
                    last_accuracy = excluded.last_accuracy,
                    last_session_time_ms = excluded.last_session_time_ms,
                    best_score = excluded.best_score
            ",
        )
        .bind(row.child_id.as_str())
        .bind(row.module.as_str())
        .bind(i64::from(row.session_count))
        .bind(i64_from_u64("total_score", row.total_score)?)
        .bind(i64_from_u64("total_correct", row.total_correct)?)
        .bind(i64_from_u64("total_attempts", row.total_attempts)?)
        .bind(i64_from_u64("total_time_ms", row.total_time_ms)?)
        .bind(row.last_played_ms)
        .bind(i64::from(row.last_score.value()))
        .bind(row.last_accuracy)
        .bind(i64_from_u64("last_session_time_ms", row.last_session_time_ms)?)
        .bind(i64::from(row.best_score.value()))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        debug!(
            child_id = %record.child_id,
            module = %record.module,
            sessions = row.session_count,
            "recorded game session"
        );
        Ok(row)
    }

    async fn analytics_for_child(&self, child: &ChildId) -> Result<Vec<AnalyticsRow>, StorageError> {
        let sql = format!("{SELECT_ANALYTICS} WHERE child_id = ?1 ORDER BY module_id ASC");
        let rows = sqlx::query(&sql)
            .bind(child.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_analytics_row).collect()
    }

    async fn sessions_for(
        &self,
        child: &ChildId,
        module: ModuleId,
        limit: u32,
    ) -> Result<Vec<GameSessionRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    child_id, module_id, started_at, ended_at, score,
                    total_correct, total_attempts, stars, completed
                FROM game_sessions
                WHERE child_id = ?1 AND module_id = ?2
                ORDER BY ended_at DESC, id DESC
                LIMIT ?3
            ",
        )
        .bind(child.as_str())
        .bind(module.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;
        rows.iter().map(map_session_row).collect()
    }

    async fn favourite_song(&self, child: &ChildId) -> Result<Option<ModuleId>, StorageError> {
        let rows = self.analytics_for_child(child).await?;
        Ok(pick_favourite_song(&rows))
    }
}
