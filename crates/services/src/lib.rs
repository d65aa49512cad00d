#![forbid(unsafe_code)]

pub mod app_services;
pub mod children;
pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod report;
pub mod rollup;
pub mod session;
pub mod sync;

pub use buds_core::Clock;

pub use app_services::AppServices;
pub use children::ChildProfileService;
pub use config::PipelineConfig;
pub use context::SessionContext;
pub use error::{
    AppServicesError, ChildServiceError, ProgressError, ReportError, RollupError, SyncError,
};
pub use progress::{GameResult, ProgressService, SaveOutcome};
pub use report::{ChildOverview, ChildReport, ModuleReport, ParentOverview, ReportService};
pub use rollup::RollupService;
pub use session::{EndedSession, SessionRecorder, SessionTracker};
pub use sync::{DrainReport, SyncDrain, SyncService, spawn_sync_worker};
