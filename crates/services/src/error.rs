//! Shared error types for the services crate.

use thiserror::Error;

use buds_core::model::{ChildProfileError, IdError};
use storage::remote::RemoteError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `SyncService` and `SyncDrain`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SyncError {
    /// Whether the remote store could not be reached at all.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SyncError::Remote(RemoteError::Unavailable(_)))
    }
}

/// Errors emitted by `RollupService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RollupError {
    #[error("rollup for {child} lost {attempts} compare-and-set races")]
    Contended { child: String, attempts: u32 },
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("no authenticated parent")]
    NotAuthenticated,
    #[error("missing {0}")]
    MissingIdentifier(&'static str),
    #[error("progress was not saved: local cache failed ({local}) and remote write failed ({remote})")]
    NotSaved {
        local: StorageError,
        remote: SyncError,
    },
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ChildProfileService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChildServiceError {
    #[error(transparent)]
    Profile(#[from] ChildProfileError),
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Errors emitted by `ReportService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
