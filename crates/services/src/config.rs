use std::time::Duration;

use buds_core::rollup::DEFAULT_TOTAL_MODULES;

/// Tunables for the progress pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Modules counted by the rollup denominator.
    pub total_modules: u32,
    /// Compare-and-set attempts before a rollup gives up.
    pub rollup_max_attempts: u32,
    /// Rows and queue items handled per drain pass.
    pub drain_batch_size: u32,
    /// Failed pushes before a queue item is parked as failed.
    pub max_sync_attempts: u32,
    pub sync_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            total_modules: DEFAULT_TOTAL_MODULES,
            rollup_max_attempts: 3,
            drain_batch_size: 50,
            max_sync_attempts: 5,
            sync_interval: Duration::from_secs(60),
        }
    }
}
