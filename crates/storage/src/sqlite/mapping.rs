use buds_core::model::{
    AnalyticsRow, CachedProgress, ChildId, ChildProfile, GameSessionRecord, ModuleId, ParentId,
    ProgressStatus, Score, SyncOperation, SyncQueueItem, SyncStatus, SyncTable,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn u64_from_i64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn i64_from_u64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn get_u32(row: &SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    u32_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

fn get_u64(row: &SqliteRow, field: &'static str) -> Result<u64, StorageError> {
    u64_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

fn get_module(row: &SqliteRow) -> Result<ModuleId, StorageError> {
    row.try_get::<String, _>("module_id")
        .map_err(ser)?
        .parse()
        .map_err(ser)
}

fn get_child_id(row: &SqliteRow) -> Result<ChildId, StorageError> {
    ChildId::new(row.try_get::<String, _>("child_id").map_err(ser)?).map_err(ser)
}

fn get_score(row: &SqliteRow, field: &'static str) -> Result<Score, StorageError> {
    Ok(Score::from_i64(row.try_get::<i64, _>(field).map_err(ser)?))
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<CachedProgress, StorageError> {
    let status: String = row.try_get("status").map_err(ser)?;
    let word_builder: Option<String> = row.try_get("word_builder").map_err(ser)?;
    Ok(CachedProgress {
        progress_id: row.try_get("progress_id").map_err(ser)?,
        parent_id: ParentId::new(row.try_get::<String, _>("parent_id").map_err(ser)?)
            .map_err(ser)?,
        child_id: get_child_id(row)?,
        module: get_module(row)?,
        score: get_score(row, "score")?,
        status: ProgressStatus::parse_lenient(&status),
        stars: get_u32(row, "stars")?,
        time_spent_ms: get_u64(row, "time_spent")?,
        correct: get_u32(row, "correct")?,
        incorrect: get_u32(row, "incorrect")?,
        word_builder: word_builder
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(ser)?,
        pending_plays: get_u32(row, "pending_plays")?,
        pending_time_ms: get_u64(row, "pending_time_ms")?,
        updated_at_ms: row.try_get("timestamp").map_err(ser)?,
        synced: row.try_get::<i64, _>("sync_status").map_err(ser)? != 0,
    })
}

pub(crate) fn map_queue_row(row: &SqliteRow) -> Result<SyncQueueItem, StorageError> {
    let table_name: String = row.try_get("table_name").map_err(ser)?;
    let table = SyncTable::from_name(&table_name)
        .ok_or_else(|| StorageError::Serialization(format!("unknown sync table: {table_name}")))?;
    let operation: String = row.try_get("operation").map_err(ser)?;
    let status: String = row.try_get("status").map_err(ser)?;
    Ok(SyncQueueItem {
        id: row.try_get("id").map_err(ser)?,
        table,
        record_id: row.try_get("record_id").map_err(ser)?,
        operation: SyncOperation::parse_lenient(&operation),
        status: SyncStatus::parse_lenient(&status),
        attempts: get_u32(row, "attempts")?,
        last_error: row.try_get("last_error").map_err(ser)?,
        created_at_ms: row.try_get("created_at").map_err(ser)?,
    })
}

pub(crate) fn map_analytics_row(row: &SqliteRow) -> Result<AnalyticsRow, StorageError> {
    Ok(AnalyticsRow {
        child_id: get_child_id(row)?,
        module: get_module(row)?,
        session_count: get_u32(row, "session_count")?,
        total_score: get_u64(row, "total_score")?,
        total_correct: get_u64(row, "total_correct")?,
        total_attempts: get_u64(row, "total_attempts")?,
        total_time_ms: get_u64(row, "total_time_ms")?,
        last_played_ms: row.try_get("last_played").map_err(ser)?,
        last_score: get_score(row, "last_score")?,
        last_accuracy: row.try_get("last_accuracy").map_err(ser)?,
        last_session_time_ms: get_u64(row, "last_session_time_ms")?,
        best_score: get_score(row, "best_score")?,
    })
}

pub(crate) fn map_session_row(row: &SqliteRow) -> Result<GameSessionRecord, StorageError> {
    Ok(GameSessionRecord {
        child_id: get_child_id(row)?,
        module: get_module(row)?,
        started_at_ms: row.try_get("started_at").map_err(ser)?,
        ended_at_ms: row.try_get("ended_at").map_err(ser)?,
        score: get_score(row, "score")?,
        total_correct: get_u32(row, "total_correct")?,
        total_attempts: get_u32(row, "total_attempts")?,
        stars: get_u32(row, "stars")?,
        completed: row.try_get::<i64, _>("completed").map_err(ser)? != 0,
    })
}

pub(crate) fn map_child_row(row: &SqliteRow) -> Result<ChildProfile, StorageError> {
    let words: String = row.try_get("words").map_err(ser)?;
    let slot = get_u32(row, "slot")?;
    let age = get_u32(row, "age")?;
    Ok(ChildProfile {
        child_id: get_child_id(row)?,
        parent_id: ParentId::new(row.try_get::<String, _>("parent_id").map_err(ser)?)
            .map_err(ser)?,
        slot: u8::try_from(slot).map_err(ser)?,
        name: row.try_get("name").map_err(ser)?,
        age: u8::try_from(age).map_err(ser)?,
        gender: row.try_get("gender").map_err(ser)?,
        learning_level: row.try_get("learning_level").map_err(ser)?,
        avatar: row.try_get("avatar").map_err(ser)?,
        words: serde_json::from_str(&words).map_err(ser)?,
        stars: get_u32(row, "stars")?,
        completed_modules: get_u32(row, "completed_modules")?,
        progress: get_u32(row, "progress")?,
        rollup_version: get_u64(row, "rollup_version")?,
        active: row.try_get::<i64, _>("active").map_err(ser)? != 0,
        updated_at_ms: row.try_get("updated_at").map_err(ser)?,
    })
}
