//! Progress bar fed from run statistics snapshots

use indicatif::{ProgressBar, ProgressStyle};
use ingest_engine::StatsHandle;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Byte-based progress bar that polls a run's statistics
pub struct IngestProgress {
    bar: ProgressBar,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: StatsHandle,
}

impl IngestProgress {
    /// Start polling `stats` every `interval`
    pub fn start(stats: StatsHandle, interval: Duration) -> Self {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}",
            )
            .map(|style| style.progress_chars("█▉▊▋▌▍▎▏  "))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = {
            let bar = bar.clone();
            let stats = stats.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = stop_rx.changed() => break,
                        _ = ticker.tick() => update(&bar, &stats).await,
                    }
                }
            })
        };

        Self {
            bar,
            stop_tx,
            task,
            stats,
        }
    }

    /// Stop polling and leave the bar at the final statistics
    pub async fn finish(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
        update(&self.bar, &self.stats).await;
        self.bar.finish();
    }
}

async fn update(bar: &ProgressBar, stats: &StatsHandle) {
    let snapshot = stats.snapshot().await;
    bar.set_length(snapshot.total_bytes);
    bar.set_position(snapshot.transferred_bytes);
    bar.set_message(format!(
        "{}/{} files, {} failed",
        snapshot.processed_files, snapshot.total_files, snapshot.failed_files
    ));
}
