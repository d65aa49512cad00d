use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use super::SqliteInitError;

pub const LATEST_SCHEMA_VERSION: i64 = 4;

/// Version 1: progress cache and sync queue.
const V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS child_progress (
            progress_id TEXT PRIMARY KEY,
            parent_id TEXT NOT NULL,
            child_id TEXT NOT NULL,
            module_id TEXT NOT NULL,
            score INTEGER NOT NULL DEFAULT 0 CHECK (score BETWEEN 0 AND 100),
            status TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            record_id TEXT NOT NULL,
            operation TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0 CHECK (attempts >= 0),
            last_error TEXT,
            created_at INTEGER NOT NULL
        );
    ",
];

/// Version 2: time spent and the synced flag, added in place.
const V2: &[&str] = &[
    "ALTER TABLE child_progress ADD COLUMN time_spent INTEGER NOT NULL DEFAULT 0;",
    "ALTER TABLE child_progress ADD COLUMN sync_status INTEGER NOT NULL DEFAULT 0;",
];

/// Version 3: profiles, session log, analytics and indexes.
const V3: &[&str] = &[
    "ALTER TABLE child_progress ADD COLUMN stars INTEGER NOT NULL DEFAULT 0;",
    r"
        CREATE TABLE IF NOT EXISTS child_profiles (
            child_id TEXT PRIMARY KEY,
            parent_id TEXT NOT NULL,
            slot INTEGER NOT NULL CHECK (slot BETWEEN 1 AND 5),
            name TEXT NOT NULL,
            age INTEGER NOT NULL DEFAULT 0,
            gender TEXT,
            learning_level TEXT,
            avatar TEXT NOT NULL,
            words TEXT NOT NULL DEFAULT '[]',
            stars INTEGER NOT NULL DEFAULT 0,
            completed_modules INTEGER NOT NULL DEFAULT 0,
            progress INTEGER NOT NULL DEFAULT 0,
            rollup_version INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            updated_at INTEGER NOT NULL,
            UNIQUE (parent_id, slot)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS game_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            child_id TEXT NOT NULL,
            module_id TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            ended_at INTEGER NOT NULL,
            duration_ms INTEGER NOT NULL CHECK (duration_ms >= 0),
            score INTEGER NOT NULL,
            total_correct INTEGER NOT NULL DEFAULT 0,
            total_attempts INTEGER NOT NULL DEFAULT 0,
            stars INTEGER NOT NULL DEFAULT 0,
            completed INTEGER NOT NULL DEFAULT 0
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS child_analytics (
            child_id TEXT NOT NULL,
            module_id TEXT NOT NULL,
            session_count INTEGER NOT NULL DEFAULT 0,
            total_score INTEGER NOT NULL DEFAULT 0,
            total_correct INTEGER NOT NULL DEFAULT 0,
            total_attempts INTEGER NOT NULL DEFAULT 0,
            total_time_ms INTEGER NOT NULL DEFAULT 0,
            last_played INTEGER NOT NULL DEFAULT 0,
            last_score INTEGER NOT NULL DEFAULT 0,
            last_accuracy REAL NOT NULL DEFAULT 0,
            last_session_time_ms INTEGER NOT NULL DEFAULT 0,
            best_score INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (child_id, module_id)
        );
    ",
    "CREATE INDEX IF NOT EXISTS idx_child_progress_child ON child_progress (child_id, module_id);",
    "CREATE INDEX IF NOT EXISTS idx_child_progress_sync ON child_progress (sync_status, timestamp);",
    "CREATE INDEX IF NOT EXISTS idx_sync_queue_status ON sync_queue (status, id);",
    "CREATE INDEX IF NOT EXISTS idx_game_sessions_child_module ON game_sessions (child_id, module_id, ended_at);",
];

/// Version 4: latest counts and the play increments still owed to the remote store.
const V4: &[&str] = &[
    "ALTER TABLE child_progress ADD COLUMN correct INTEGER NOT NULL DEFAULT 0;",
    "ALTER TABLE child_progress ADD COLUMN incorrect INTEGER NOT NULL DEFAULT 0;",
    "ALTER TABLE child_progress ADD COLUMN word_builder TEXT;",
    "ALTER TABLE child_progress ADD COLUMN pending_plays INTEGER NOT NULL DEFAULT 0;",
    "ALTER TABLE child_progress ADD COLUMN pending_time_ms INTEGER NOT NULL DEFAULT 0;",
];

const STEPS: [(i64, &[&str]); 4] = [(1, V1), (2, V2), (3, V3), (4, V4)];

async fn ensure_version_table(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
        .bind(version)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

async fn apply(
    tx: &mut Transaction<'_, Sqlite>,
    version: i64,
    statements: &[&str],
) -> Result<(), sqlx::Error> {
    for statement in statements {
        sqlx::query(*statement).execute(&mut **tx).await?;
    }
    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
        ",
    )
    .bind(version)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(crate) async fn current_version(pool: &SqlitePool) -> Result<i64, SqliteInitError> {
    ensure_version_table(pool).await?;
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Applies every pending migration up to `target`, one transaction per version.
///
/// Databases created by an older build are upgraded in place.
pub async fn run_migrations(pool: &SqlitePool, target: i64) -> Result<(), SqliteInitError> {
    ensure_version_table(pool).await?;

    for (version, statements) in STEPS {
        if version > target || is_applied(pool, version).await? {
            continue;
        }
        let mut tx = pool.begin().await?;
        apply(&mut tx, version, statements).await?;
        tx.commit().await?;
        info!(version, "applied schema migration");
    }

    Ok(())
}
