use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::repository::{
    AnalyticsRepository, ChildProfileRepository, ProgressCacheRepository, Storage,
    SyncQueueRepository,
};

mod analytics_repo;
mod child_repo;
mod mapping;
mod migrate;
mod progress_repo;
mod sync_queue_repo;

pub use migrate::LATEST_SCHEMA_VERSION;

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or if
    /// enforcing foreign key constraints fails during setup.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA foreign_keys = ON;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Bring the schema up to the latest version.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool, LATEST_SCHEMA_VERSION).await
    }

    /// Apply migrations up to and including `target`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate_to(&self, target: i64) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool, target).await
    }

    /// Highest applied schema version, 0 for a fresh database.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the version table cannot be read.
    pub async fn schema_version(&self) -> Result<i64, SqliteInitError> {
        migrate::current_version(&self.pool).await
    }
}

impl Storage {
    /// Build a `Storage` backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(database_url: &str) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;
        let progress: Arc<dyn ProgressCacheRepository> = Arc::new(repo.clone());
        let sync_queue: Arc<dyn SyncQueueRepository> = Arc::new(repo.clone());
        let analytics: Arc<dyn AnalyticsRepository> = Arc::new(repo.clone());
        let children: Arc<dyn ChildProfileRepository> = Arc::new(repo);
        Ok(Self {
            progress,
            sync_queue,
            analytics,
            children,
        })
    }
}
