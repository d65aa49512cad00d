use buds_core::model::{ChildId, ChildProfile, ParentId};

use super::SqliteRepository;
use super::mapping::{conn, i64_from_u64, map_child_row, ser};
use crate::repository::{ChildProfileRepository, StorageError};

const SELECT_CHILD: &str = r"
    SELECT
        child_id, parent_id, slot, name, age, gender, learning_level, avatar, words,
        stars, completed_modules, progress, rollup_version, active, updated_at
    FROM child_profiles
";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl ChildProfileRepository for SqliteRepository {
    async fn upsert_child(&self, profile: &ChildProfile) -> Result<(), StorageError> {
        let words = serde_json::to_string(&profile.words).map_err(ser)?;
        sqlx::query(
            r"
                INSERT INTO child_profiles (
                    child_id, parent_id, slot, name, age, gender, learning_level, avatar,
                    words, stars, completed_modules, progress, rollup_version, active, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                ON CONFLICT(child_id) DO UPDATE SET
                    name = excluded.name,
                    age = excluded.age,
                    gender = excluded.gender,
                    learning_level = excluded.learning_level,
                    avatar = excluded.avatar,
                    words = excluded.words,
                    stars = excluded.stars,
                    completed_modules = excluded.completed_modules,
                    progress = excluded.progress,
                    rollup_version = excluded.rollup_version,
                    active = excluded.active,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(profile.child_id.as_str())
        .bind(profile.parent_id.as_str())
        .bind(i64::from(profile.slot))
        .bind(&profile.name)
        .bind(i64::from(profile.age))
        .bind(profile.gender.as_deref())
        .bind(profile.learning_level.as_deref())
        .bind(&profile.avatar)
        .bind(words)
        .bind(i64::from(profile.stars))
        .bind(i64::from(profile.completed_modules))
        .bind(i64::from(profile.progress))
        .bind(i64_from_u64("rollup_version", profile.rollup_version)?)
        .bind(i64::from(profile.active))
        .bind(profile.updated_at_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict
            } else {
                conn(e)
            }
        })?;
        Ok(())
    }

    async fn get_child(&self, id: &ChildId) -> Result<ChildProfile, StorageError> {
        let sql = format!("{SELECT_CHILD} WHERE child_id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        map_child_row(&row)
    }

    async fn children_for_parent(
        &self,
        parent: &ParentId,
    ) -> Result<Vec<ChildProfile>, StorageError> {
        let sql = format!("{SELECT_CHILD} WHERE parent_id = ?1 AND active = 1 ORDER BY slot ASC");
        let rows = sqlx::query(&sql)
            .bind(parent.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter().map(map_child_row).collect()
    }
}
