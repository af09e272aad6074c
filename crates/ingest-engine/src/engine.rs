//! Transfer engine: turns a device's file list into finished transfers

use crate::classifier::Classifier;
use crate::executor::{run_workers, CopyOptions};
use crate::monitor::StatsHandle;
use crate::resolver::claim_destination;
use crate::scheduler::{dispatch_order, is_priority};
use ingest_types::{EngineSettings, Error, Result, TransferJob, TransferStats};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Classifies, schedules and copies one run's files
///
/// Each engine owns the statistics of the run it executes. Devices processed
/// concurrently each get their own engine.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    settings: Arc<EngineSettings>,
    classifier: Arc<Classifier>,
    options: Arc<CopyOptions>,
    stats: StatsHandle,
}

impl TransferEngine {
    /// Create an engine around a compiled classifier
    pub fn new(settings: Arc<EngineSettings>, classifier: Arc<Classifier>) -> Self {
        let options = Arc::new(CopyOptions::from_settings(&settings));
        Self {
            settings,
            classifier,
            options,
            stats: StatsHandle::new(),
        }
    }

    /// Create an engine, compiling the classifier from `settings`
    pub fn from_settings(settings: EngineSettings) -> Result<Self> {
        let classifier = Arc::new(Classifier::new(&settings)?);
        Ok(Self::new(Arc::new(settings), classifier))
    }

    /// Handle to this engine's run statistics
    pub fn stats(&self) -> StatsHandle {
        self.stats.clone()
    }

    /// Settings the engine runs with
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Build the run's jobs in dispatch order and start its statistics
    ///
    /// Directories in `files` are skipped. Files that cannot be inspected or
    /// given a destination are counted as failed here and get no job.
    /// Destinations are claimed in list order, so repeated names version
    /// deterministically. The destination root is created when missing; the
    /// run fails only when that is impossible.
    pub async fn prepare(&self, files: &[PathBuf]) -> Result<Vec<TransferJob>> {
        let root = self.classifier.destination_root();
        if let Err(e) = tokio::fs::create_dir_all(root).await {
            return Err(Error::DestinationUnavailable {
                path: root.to_path_buf(),
                message: e.to_string(),
            });
        }

        let mut sized = Vec::with_capacity(files.len());
        let mut unreadable = 0u64;
        for path in files {
            match tokio::fs::metadata(path).await {
                Ok(metadata) if metadata.is_dir() => {
                    debug!("Skipping directory {}", path.display());
                }
                Ok(metadata) => sized.push((path, metadata.len())),
                Err(e) => {
                    error!("Failed to stat {}: {}", path.display(), e);
                    unreadable += 1;
                }
            }
        }

        let total_files = sized.len() as u64 + unreadable;
        let total_bytes = sized.iter().map(|(_, size)| size).sum();
        self.stats.begin(total_files, total_bytes).await;
        for _ in 0..unreadable {
            self.stats.record_failure().await;
        }

        let mut jobs = Vec::with_capacity(sized.len());
        for (path, size) in sized {
            let classification = self.classifier.classify(path);
            let planned = self.classifier.destination_path(&classification);
            let destination = match claim_destination(&planned).await {
                Ok(destination) => destination,
                Err(e) => {
                    error!("No destination for {}: {}", path.display(), e);
                    self.stats.record_failure().await;
                    continue;
                }
            };

            let priority = is_priority(&classification.file_name, &self.settings.priority_prefixes);
            debug!(
                "Planned {} -> {}{}",
                path.display(),
                destination.display(),
                if priority { " (priority)" } else { "" }
            );
            jobs.push(TransferJob {
                source: path.clone(),
                destination,
                size,
                priority,
                classification,
            });
        }

        Ok(dispatch_order(jobs))
    }

    /// Run prepared jobs through the worker pool and wait for all of them
    pub async fn dispatch(&self, jobs: Vec<TransferJob>) {
        let priority = jobs.iter().filter(|job| job.priority).count();
        info!(
            "Dispatching {} jobs ({} priority) to {} workers",
            jobs.len(),
            priority,
            self.settings.workers.get()
        );
        run_workers(
            jobs,
            self.settings.workers,
            Arc::clone(&self.options),
            self.stats.clone(),
        )
        .await;
    }

    /// Transfer every file in `files` and return the final statistics
    ///
    /// Per-file failures are counted, never returned.
    pub async fn transfer_files(&self, device_name: &str, files: &[PathBuf]) -> Result<TransferStats> {
        info!("Starting transfer of {} files from {}", files.len(), device_name);

        let jobs = self.prepare(files).await?;
        self.dispatch(jobs).await;

        let stats = self.stats.snapshot().await;
        info!(
            "Transfer from {} finished: {}/{} files succeeded, {} failed, {} bytes in {:?}",
            device_name,
            stats.succeeded_files(),
            stats.total_files,
            stats.failed_files,
            stats.transferred_bytes,
            stats.elapsed()
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CAMERA_PATTERN: &str = r"^([^_]+)_([^_]+)_(ACam|BCam|CCam)_(.+)$";

    struct Fixture {
        _temp_dir: TempDir,
        card: PathBuf,
        storage: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let card = temp_dir.path().join("card");
        let storage = temp_dir.path().join("storage");
        std::fs::create_dir_all(&card).unwrap();
        std::fs::create_dir_all(&storage).unwrap();
        Fixture {
            _temp_dir: temp_dir,
            card,
            storage,
        }
    }

    fn settings(storage: &std::path::Path) -> EngineSettings {
        let mut settings = EngineSettings::new(storage);
        settings.pattern = CAMERA_PATTERN.to_string();
        settings.workers = ingest_types::WorkerCount::clamped(3);
        settings
    }

    fn write(dir: &std::path::Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_transfer_organises_files() {
        let fx = fixture();
        let files = vec![
            write(&fx.card, "BrandVideo_Nike_ACam_001.mp4", b"nike"),
            write(&fx.card, "Interview_Tesla_CCam_Take5.mxf", b"tesla"),
            write(&fx.card, "random_video.mp4", b"random"),
        ];

        let engine = TransferEngine::from_settings(settings(&fx.storage)).unwrap();
        let stats = engine.transfer_files("card", &files).await.unwrap();

        assert_eq!(stats.total_files, 3);
        assert!(stats.is_complete());
        assert_eq!(stats.failed_files, 0);
        assert_eq!(stats.transferred_bytes, 15);
        assert_eq!(
            std::fs::read(fx.storage.join("Nike/BrandVideo/ACam/001.mp4")).unwrap(),
            b"nike"
        );
        assert!(fx.storage.join("Tesla/Interview/CCam/Take5.mxf").is_file());
        assert!(fx.storage.join("Unsorted/random_video.mp4").is_file());
    }

    #[tokio::test]
    async fn test_prepare_puts_priority_first() {
        let fx = fixture();
        let files = vec![
            write(&fx.card, "b_normal.mp4", b"1"),
            write(&fx.card, "RUSH_one.mp4", b"2"),
            write(&fx.card, "a_normal.mp4", b"3"),
            write(&fx.card, "RUSH_two.mp4", b"4"),
        ];
        let mut settings = settings(&fx.storage);
        settings.priority_prefixes = vec!["RUSH_".to_string()];

        let engine = TransferEngine::from_settings(settings).unwrap();
        let jobs = engine.prepare(&files).await.unwrap();
        let names: Vec<&str> = jobs.iter().map(TransferJob::file_name).collect();

        assert_eq!(
            names,
            vec!["RUSH_one.mp4", "RUSH_two.mp4", "b_normal.mp4", "a_normal.mp4"]
        );
    }

    #[tokio::test]
    async fn test_same_destination_is_versioned() {
        let fx = fixture();
        std::fs::create_dir_all(fx.card.join("day2")).unwrap();
        let files = vec![
            write(&fx.card, "Spot_Acme_ACam_001.mp4", b"day one"),
            write(&fx.card.join("day2"), "Spot_Acme_ACam_001.mp4", b"day two"),
        ];
        let existing = fx.storage.join("Acme/Spot/ACam");
        std::fs::create_dir_all(&existing).unwrap();
        std::fs::write(existing.join("001.mp4"), b"archived").unwrap();

        let engine = TransferEngine::from_settings(settings(&fx.storage)).unwrap();
        let stats = engine.transfer_files("card", &files).await.unwrap();

        assert_eq!(stats.failed_files, 0);
        assert_eq!(std::fs::read(existing.join("001.mp4")).unwrap(), b"archived");
        assert_eq!(std::fs::read(existing.join("001_v2.mp4")).unwrap(), b"day one");
        assert_eq!(std::fs::read(existing.join("001_v3.mp4")).unwrap(), b"day two");
    }

    #[tokio::test]
    async fn test_missing_and_directory_entries() {
        let fx = fixture();
        std::fs::create_dir_all(fx.card.join("DCIM")).unwrap();
        let files = vec![
            write(&fx.card, "random_video.mp4", b"ok"),
            fx.card.join("vanished.mp4"),
            fx.card.join("DCIM"),
        ];

        let engine = TransferEngine::from_settings(settings(&fx.storage)).unwrap();
        let stats = engine.transfer_files("card", &files).await.unwrap();

        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.processed_files, 2);
        assert_eq!(stats.failed_files, 1);
        assert!(!fx.storage.join("Unsorted/vanished.mp4").exists());
    }

    #[tokio::test]
    async fn test_missing_root_is_created() {
        let fx = fixture();
        let files = vec![write(&fx.card, "random_video.mp4", b"ok")];
        let root = fx.storage.join("fresh/volume");

        let engine = TransferEngine::from_settings(settings(&root)).unwrap();
        let stats = engine.transfer_files("card", &files).await.unwrap();

        assert_eq!(stats.failed_files, 0);
        assert_eq!(std::fs::read(root.join("Unsorted/random_video.mp4")).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_root_that_is_a_file_fails_before_dispatch() {
        let fx = fixture();
        let files = vec![write(&fx.card, "random_video.mp4", b"ok")];
        let root = write(&fx.storage, "occupied", b"not a directory");

        let engine = TransferEngine::from_settings(settings(&root)).unwrap();
        let result = engine.transfer_files("card", &files).await;

        assert!(matches!(result, Err(Error::DestinationUnavailable { .. })));
        assert_eq!(engine.stats().snapshot().await.total_files, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_name_is_stored_unchanged() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let fx = fixture();
        let name = OsStr::from_bytes(b"clip\xff.mp4");
        let source = fx.card.join(name);
        std::fs::write(&source, b"raw").unwrap();

        let engine = TransferEngine::from_settings(settings(&fx.storage)).unwrap();
        let stats = engine.transfer_files("card", &[source]).await.unwrap();

        assert_eq!(stats.failed_files, 0);
        let stored: Vec<_> = std::fs::read_dir(fx.storage.join("Unsorted"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(stored, vec![name.to_os_string()]);
    }

    #[tokio::test]
    async fn test_empty_file_list() {
        let fx = fixture();
        let engine = TransferEngine::from_settings(settings(&fx.storage)).unwrap();
        let stats = engine.transfer_files("card", &[]).await.unwrap();
        assert_eq!(stats.total_files, 0);
        assert!(stats.is_complete());
    }
}
