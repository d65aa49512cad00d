use std::sync::Arc;

use buds_core::model::ModuleId;
use storage::remote::{DocumentStore, HttpDocumentStore, HttpStoreConfig, InMemoryDocumentStore};
use storage::repository::Storage;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::Clock;
use crate::children::ChildProfileService;
use crate::config::PipelineConfig;
use crate::context::SessionContext;
use crate::error::AppServicesError;
use crate::progress::ProgressService;
use crate::report::ReportService;
use crate::rollup::RollupService;
use crate::session::{SessionRecorder, SessionTracker};
use crate::sync::{SyncDrain, SyncService, spawn_sync_worker};

/// Assembles the pipeline services over one local store and one remote store.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    config: PipelineConfig,
    sync: SyncService,
    rollup: RollupService,
    progress: ProgressService,
    recorder: SessionRecorder,
    children: ChildProfileService,
    reports: ReportService,
    drain: Arc<SyncDrain>,
}

impl AppServices {
    #[must_use]
    pub fn new(
        clock: Clock,
        storage: &Storage,
        store: Arc<dyn DocumentStore>,
        config: PipelineConfig,
    ) -> Self {
        let sync = SyncService::new(clock, store);
        let rollup = RollupService::new(
            clock,
            sync.clone(),
            Arc::clone(&storage.children),
            config.total_modules,
            config.rollup_max_attempts,
        );
        let progress = ProgressService::new(
            clock,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.sync_queue),
            sync.clone(),
            rollup.clone(),
        );
        let recorder = SessionRecorder::new(Arc::clone(&storage.analytics), progress.clone());
        let children = ChildProfileService::new(
            clock,
            Arc::clone(&storage.children),
            Arc::clone(&storage.sync_queue),
            sync.clone(),
        );
        let reports = ReportService::new(
            Arc::clone(&storage.analytics),
            Arc::clone(&storage.children),
            sync.clone(),
            config.total_modules,
        );
        let drain = Arc::new(SyncDrain::new(
            clock,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.sync_queue),
            Arc::clone(&storage.children),
            sync.clone(),
            rollup.clone(),
            config.max_sync_attempts,
            config.drain_batch_size,
        ));

        Self {
            clock,
            config,
            sync,
            rollup,
            progress,
            recorder,
            children,
            reports,
            drain,
        }
    }

    /// Services over in-memory local and remote stores.
    #[must_use]
    pub fn in_memory(clock: Clock, store: InMemoryDocumentStore) -> Self {
        Self::new(clock, &Storage::in_memory(), Arc::new(store), PipelineConfig::default())
    }

    /// Build services backed by `SQLite` and, when `remote` is given, the HTTP store.
    ///
    /// Without a remote every push fails as unavailable, so sessions are kept
    /// locally and queued until a store is configured.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization or the HTTP client fails.
    pub async fn new_sqlite(
        db_url: &str,
        remote: Option<HttpStoreConfig>,
        clock: Clock,
        config: PipelineConfig,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let store: Arc<dyn DocumentStore> = match remote {
            Some(remote) => Arc::new(HttpDocumentStore::new(remote)?),
            None => {
                let offline = InMemoryDocumentStore::new();
                offline.set_offline(true);
                Arc::new(offline)
            }
        };
        Ok(Self::new(clock, &storage, store, config))
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn sync(&self) -> &SyncService {
        &self.sync
    }

    #[must_use]
    pub fn rollup(&self) -> &RollupService {
        &self.rollup
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressService {
        &self.progress
    }

    #[must_use]
    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    #[must_use]
    pub fn children(&self) -> &ChildProfileService {
        &self.children
    }

    #[must_use]
    pub fn reports(&self) -> &ReportService {
        &self.reports
    }

    #[must_use]
    pub fn drain(&self) -> Arc<SyncDrain> {
        Arc::clone(&self.drain)
    }

    /// New tracker for one module screen.
    #[must_use]
    pub fn tracker(&self, ctx: SessionContext, module: ModuleId) -> SessionTracker {
        SessionTracker::new(ctx, module, self.recorder.clone()).with_clock(self.clock)
    }

    /// Background drain on the configured interval.
    #[must_use]
    pub fn spawn_sync_worker(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        spawn_sync_worker(self.drain(), self.config.sync_interval, shutdown)
    }
}
