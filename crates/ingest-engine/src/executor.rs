//! Worker pool that copies transfer jobs
//!
//! Jobs flow through one bounded queue shared by a fixed number of workers.
//! Every job ends in exactly one statistics update, success or failure, and a
//! failed job never stops its worker.

use crate::checksum::{hash_file, ContentHasher};
use crate::monitor::StatsHandle;
use crate::resolver::release_destination;
use ingest_types::{
    ChecksumAlgorithm, EngineSettings, Error, Result, RetryConfig, TransferJob, WorkerCount,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn, Instrument};

/// Per-job copy behaviour
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Read buffer size in bytes
    pub buffer_size: usize,
    /// Whether to digest source and destination and compare them
    pub verify: bool,
    /// Digest used for verification
    pub algorithm: ChecksumAlgorithm,
    /// Retry policy for retryable failures
    pub retry: RetryConfig,
}

impl CopyOptions {
    /// Copy options taken from engine settings
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            buffer_size: settings.buffer_size.max(1),
            verify: settings.verify_checksums,
            algorithm: settings.checksum_algorithm,
            retry: settings.retry.clone(),
        }
    }
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self::from_settings(&EngineSettings::new(""))
    }
}

/// What a finished byte copy produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    /// Bytes written to the destination
    pub bytes: u64,
    /// Digest of the source stream, present only when verifying
    pub source_digest: Option<String>,
}

/// Stream `source` into `destination`, digesting the source when verifying
///
/// The destination's parent tree is created and the destination is truncated.
pub async fn copy_file(
    source: &Path,
    destination: &Path,
    options: &CopyOptions,
) -> Result<CopyOutcome> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_at(parent, &e))?;
    }

    let mut reader = tokio::fs::File::open(source)
        .await
        .map_err(|e| Error::io_at(source, &e))?;
    let mut writer = tokio::fs::File::create(destination)
        .await
        .map_err(|e| Error::io_at(destination, &e))?;

    let mut hasher = options.verify.then(|| ContentHasher::new(options.algorithm));
    let mut buffer = vec![0u8; options.buffer_size.max(1)];
    let mut bytes = 0u64;

    loop {
        let n = reader
            .read(&mut buffer)
            .await
            .map_err(|e| Error::io_at(source, &e))?;
        if n == 0 {
            break;
        }
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(&buffer[..n]);
        }
        writer
            .write_all(&buffer[..n])
            .await
            .map_err(|e| Error::io_at(destination, &e))?;
        bytes += n as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| Error::io_at(destination, &e))?;

    Ok(CopyOutcome {
        bytes,
        source_digest: hasher.map(ContentHasher::finalize),
    })
}

/// Re-read `destination` and compare it with the source digest
///
/// Does nothing when the copy carried no digest. On mismatch
/// [`Error::ChecksumMismatch`] names `source`; the destination is left in place
/// so a retry rewrites it under the same claim.
pub async fn verify_written(
    source: &Path,
    destination: &Path,
    outcome: &CopyOutcome,
    options: &CopyOptions,
) -> Result<()> {
    let Some(expected) = outcome.source_digest.as_deref() else {
        return Ok(());
    };

    let actual = hash_file(destination, options.algorithm, options.buffer_size).await?;
    if actual != expected {
        return Err(Error::ChecksumMismatch {
            path: source.to_path_buf(),
        });
    }
    Ok(())
}

/// Copy and verify one job once, returning the bytes written
pub async fn transfer_once(job: &TransferJob, options: &CopyOptions) -> Result<u64> {
    let outcome = copy_file(&job.source, &job.destination, options).await?;
    verify_written(&job.source, &job.destination, &outcome, options).await?;
    Ok(outcome.bytes)
}

/// [`transfer_once`] with the retry policy applied to retryable failures
///
/// The destination stays claimed across attempts and is truncated by each one.
pub async fn transfer_job(job: &TransferJob, options: &CopyOptions) -> Result<u64> {
    let mut attempt = 0;
    loop {
        match transfer_once(job, options).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_retryable() && attempt < options.retry.max_retries => {
                let delay = options.retry.delay_for_attempt(attempt);
                attempt += 1;
                warn!(
                    "Transfer of {} failed (attempt {}/{}), retrying in {:?}: {}",
                    job.file_name(),
                    attempt,
                    options.retry.max_retries + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn run_worker(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<TransferJob>>>,
    options: Arc<CopyOptions>,
    stats: StatsHandle,
) {
    loop {
        let job = queue.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        match transfer_job(&job, &options).await {
            Ok(bytes) => {
                info!(
                    "Transferred {} -> {} ({} bytes)",
                    job.source.display(),
                    job.destination.display(),
                    bytes
                );
                stats.record_success(bytes).await;
            }
            Err(e) => {
                error!("Failed to transfer {}: {}", job.source.display(), e);
                release_destination(&job.destination).await;
                stats.record_failure().await;
            }
        }
    }
    debug!("Worker {} finished", id);
}

/// Run `jobs` through `workers` workers in the given order
///
/// Returns once the queue is drained and every worker has exited.
pub async fn run_workers(
    jobs: Vec<TransferJob>,
    workers: WorkerCount,
    options: Arc<CopyOptions>,
    stats: StatsHandle,
) {
    let workers = workers.get();
    let (tx, rx) = mpsc::channel(workers * 2);
    let queue = Arc::new(Mutex::new(rx));

    let handles: Vec<_> = (0..workers)
        .map(|id| {
            tokio::spawn(
                run_worker(id, Arc::clone(&queue), Arc::clone(&options), stats.clone())
                    .in_current_span(),
            )
        })
        .collect();

    for job in jobs {
        if tx.send(job).await.is_err() {
            error!("Transfer queue closed before every job was dispatched");
            break;
        }
    }
    drop(tx);

    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!("Transfer worker ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::claim_destination;
    use ingest_types::ClassifiedFile;
    use rstest::rstest;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn job(source: PathBuf, destination: PathBuf) -> TransferJob {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        TransferJob {
            size: std::fs::metadata(&source).map(|m| m.len()).unwrap_or(0),
            classification: ClassifiedFile {
                original_path: source.clone(),
                file_name,
                extension: String::new(),
                identity: None,
            },
            source,
            destination,
            priority: false,
        }
    }

    fn options(verify: bool) -> CopyOptions {
        CopyOptions {
            buffer_size: 4096,
            verify,
            ..CopyOptions::default()
        }
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    #[tokio::test]
    async fn test_copy_creates_tree_and_content(#[case] verify: bool) {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("clip.mp4");
        let content: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&source, &content).unwrap();
        let destination = temp_dir.path().join("out/Nike/BrandVideo/ACam/001.mp4");

        let bytes = transfer_once(&job(source, destination.clone()), &options(verify))
            .await
            .unwrap();

        assert_eq!(bytes, content.len() as u64);
        assert_eq!(std::fs::read(&destination).unwrap(), content);
    }

    #[tokio::test]
    async fn test_corruption_detected_when_verifying() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("clip.mp4");
        std::fs::write(&source, b"original frames").unwrap();
        let destination = temp_dir.path().join("dest/clip.mp4");
        let options = options(true);

        let outcome = copy_file(&source, &destination, &options).await.unwrap();
        assert!(outcome.source_digest.is_some());
        std::fs::write(&destination, b"corrupted frames").unwrap();

        let result = verify_written(&source, &destination, &outcome, &options).await;
        assert!(matches!(result, Err(Error::ChecksumMismatch { path }) if path == source));
        assert!(destination.exists());
    }

    #[tokio::test]
    async fn test_mismatched_destination_stays_claimed_for_retry() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("clip.mp4");
        std::fs::write(&source, b"original frames").unwrap();
        let planned = temp_dir.path().join("dest/clip.mp4");
        let options = options(true);

        let destination = claim_destination(&planned).await.unwrap();
        let outcome = copy_file(&source, &destination, &options).await.unwrap();
        std::fs::write(&destination, b"corrupted frames").unwrap();
        assert!(verify_written(&source, &destination, &outcome, &options)
            .await
            .is_err());

        // Another run asking for the same name while the retry is pending
        let rival = claim_destination(&planned).await.unwrap();
        assert_eq!(rival, temp_dir.path().join("dest/clip_v2.mp4"));

        let bytes = transfer_once(&job(source, destination.clone()), &options)
            .await
            .unwrap();
        assert_eq!(bytes, 15);
        assert_eq!(std::fs::read(&destination).unwrap(), b"original frames");
        assert_eq!(std::fs::read(&rival).unwrap(), b"");
    }

    #[tokio::test]
    async fn test_corruption_undetected_without_verification() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("clip.mp4");
        std::fs::write(&source, b"original frames").unwrap();
        let destination = temp_dir.path().join("dest/clip.mp4");
        let options = options(false);

        let outcome = copy_file(&source, &destination, &options).await.unwrap();
        assert!(outcome.source_digest.is_none());
        std::fs::write(&destination, b"corrupted frames").unwrap();

        verify_written(&source, &destination, &outcome, &options)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"corrupted frames");
    }

    #[tokio::test]
    async fn test_missing_source_is_not_retried() {
        let temp_dir = TempDir::new().unwrap();
        let mut options = options(true);
        options.retry = RetryConfig::new(3, Duration::from_secs(60), Duration::from_secs(60), 2.0)
            .unwrap();

        let missing = job(
            temp_dir.path().join("gone.mp4"),
            temp_dir.path().join("dest/gone.mp4"),
        );
        let result = tokio::time::timeout(Duration::from_secs(5), transfer_job(&missing, &options))
            .await
            .unwrap();
        assert!(matches!(result, Err(Error::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn test_pool_counts_every_job_once() {
        let temp_dir = TempDir::new().unwrap();
        let mut jobs = Vec::new();
        for i in 0..20 {
            let source = temp_dir.path().join(format!("src_{:02}.bin", i));
            std::fs::write(&source, vec![i as u8; 100]).unwrap();
            jobs.push(job(source, temp_dir.path().join(format!("dst/{:02}.bin", i))));
        }
        jobs.push(job(
            temp_dir.path().join("missing.bin"),
            temp_dir.path().join("dst/missing.bin"),
        ));

        let stats = StatsHandle::new();
        stats.begin(jobs.len() as u64, 2000).await;
        run_workers(
            jobs,
            WorkerCount::clamped(4),
            Arc::new(options(true)),
            stats.clone(),
        )
        .await;

        let snapshot = stats.snapshot().await;
        assert!(snapshot.is_complete());
        assert_eq!(snapshot.total_files, 21);
        assert_eq!(snapshot.failed_files, 1);
        assert_eq!(snapshot.transferred_bytes, 2000);
        assert!(!temp_dir.path().join("dst/missing.bin").exists());
    }

    #[tokio::test]
    async fn test_single_worker_consumes_in_queue_order() {
        let temp_dir = TempDir::new().unwrap();
        let dest_dir = temp_dir.path().join("dst");
        let mut jobs = Vec::new();
        for name in ["b", "a", "c"] {
            let source = temp_dir.path().join(name);
            std::fs::write(&source, name).unwrap();
            jobs.push(job(source, dest_dir.join(name)));
        }

        let stats = StatsHandle::new();
        stats.begin(3, 3).await;
        run_workers(
            jobs,
            WorkerCount::clamped(1),
            Arc::new(options(false)),
            stats.clone(),
        )
        .await;

        let modified = |name: &str| std::fs::metadata(dest_dir.join(name)).unwrap().modified().unwrap();
        assert!(modified("b") <= modified("a"));
        assert!(modified("a") <= modified("c"));
        assert!(stats.snapshot().await.is_complete());
    }
}
