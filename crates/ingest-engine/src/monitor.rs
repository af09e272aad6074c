//! Run statistics shared between workers and observers

use ingest_types::TransferStats;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::error;

/// Shared handle to one run's statistics
///
/// All counters live behind a single lock so a snapshot never mixes values
/// from before and after one job's update.
#[derive(Debug, Clone, Default)]
pub struct StatsHandle {
    inner: Arc<RwLock<TransferStats>>,
}

impl StatsHandle {
    /// Statistics for a run starting now
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of the statistics
    pub async fn snapshot(&self) -> TransferStats {
        self.inner.read().await.clone()
    }

    /// Restart the clock and fix the run's totals
    pub async fn begin(&self, total_files: u64, total_bytes: u64) {
        let mut stats = self.inner.write().await;
        *stats = TransferStats::new();
        stats.total_files = total_files;
        stats.total_bytes = total_bytes;
    }

    /// Record a job that completed successfully
    ///
    /// Ignored, with an error logged, once every file of the run is counted.
    pub async fn record_success(&self, bytes: u64) {
        let mut stats = self.inner.write().await;
        if !has_room(&stats) {
            return;
        }
        stats.processed_files += 1;
        stats.transferred_bytes += bytes;
    }

    /// Record a job that failed
    ///
    /// Ignored, with an error logged, once every file of the run is counted.
    pub async fn record_failure(&self) {
        let mut stats = self.inner.write().await;
        if !has_room(&stats) {
            return;
        }
        stats.processed_files += 1;
        stats.failed_files += 1;
    }
}

fn has_room(stats: &TransferStats) -> bool {
    if stats.processed_files < stats.total_files {
        return true;
    }
    error!(
        "Dropping record beyond run totals ({} of {} files already processed)",
        stats.processed_files, stats.total_files
    );
    false
}
