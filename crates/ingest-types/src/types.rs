//! Core data types for mediaingest
//!
//! Devices, classification results, transfer jobs and run statistics.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Unique identifier for one ingest run
pub type RunId = uuid::Uuid;

/// File size in bytes
pub type FileSize = u64;

/// Transfer rate in bytes per second
pub type TransferRate = f64;

/// A removable storage volume
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Device {
    /// Identifier (kernel name or drive letter)
    pub name: String,
    /// Raw device path (`/dev/sdb1`, `E:\`)
    pub path: PathBuf,
    /// Where the volume is mounted, `None` until mounted
    pub mount_path: Option<PathBuf>,
    /// Filesystem type as reported by the platform
    pub filesystem: String,
    /// Size in bytes
    pub size: u64,
    /// Volume label
    pub label: String,
}

impl Device {
    /// Create a device with an identifier and a raw path
    pub fn new<S: Into<String>, P: Into<PathBuf>>(name: S, path: P) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            mount_path: None,
            filesystem: String::new(),
            size: 0,
            label: String::new(),
        }
    }

    /// Set the filesystem type
    pub fn with_filesystem<S: Into<String>>(mut self, filesystem: S) -> Self {
        self.filesystem = filesystem.into();
        self
    }

    /// Set the size in bytes
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the volume label
    pub fn with_label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = label.into();
        self
    }

    /// Set the mount path
    pub fn with_mount_path<P: Into<PathBuf>>(mut self, mount_path: P) -> Self {
        self.mount_path = Some(mount_path.into());
        self
    }

    /// Whether the device currently has a mount path
    pub fn is_mounted(&self) -> bool {
        self.mount_path.is_some()
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.label.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.label)
        }
    }
}

/// Identity tokens captured from a file name that matched the pattern
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClipIdentity {
    /// Project name (first capture)
    pub project: String,
    /// Client name (second capture)
    pub client: String,
    /// Camera designator (third capture)
    pub camera: String,
    /// Remainder of the clip name (fourth capture)
    pub clip: String,
}

/// Result of classifying one source file. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClassifiedFile {
    /// Path the file was found at
    pub original_path: PathBuf,
    /// Base name of the file
    pub file_name: String,
    /// Extension including the leading dot, empty when there is none
    pub extension: String,
    /// Captured tokens, `None` when the name did not match
    pub identity: Option<ClipIdentity>,
}

impl ClassifiedFile {
    /// Whether the file name matched the classification pattern
    pub fn is_matched(&self) -> bool {
        self.identity.is_some()
    }
}

/// A single file scheduled for transfer. Owned by exactly one worker while it runs.
#[derive(Debug, Clone)]
pub struct TransferJob {
    /// Source path on the device
    pub source: PathBuf,
    /// Resolved, collision-free destination path
    pub destination: PathBuf,
    /// Size of the source in bytes
    pub size: FileSize,
    /// Whether the job belongs to the priority tier
    pub priority: bool,
    /// Classification of the source file
    pub classification: ClassifiedFile,
}

impl TransferJob {
    /// Base name of the source file
    pub fn file_name(&self) -> &str {
        &self.classification.file_name
    }
}

/// Aggregate statistics for one ingest run
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// Files in the captured list; fixed once dispatch starts
    pub total_files: u64,
    /// Files that reached a terminal outcome
    pub processed_files: u64,
    /// Files that failed
    pub failed_files: u64,
    /// Bytes queued for transfer
    pub total_bytes: u64,
    /// Bytes of successfully transferred files
    pub transferred_bytes: u64,
    /// Wall-clock start of the run
    pub started_at: chrono::DateTime<chrono::Utc>,
    started: Instant,
}

impl TransferStats {
    /// Create statistics for a run starting now
    pub fn new() -> Self {
        Self {
            total_files: 0,
            processed_files: 0,
            failed_files: 0,
            total_bytes: 0,
            transferred_bytes: 0,
            started_at: chrono::Utc::now(),
            started: Instant::now(),
        }
    }

    /// Files that completed successfully
    pub fn succeeded_files(&self) -> u64 {
        self.processed_files.saturating_sub(self.failed_files)
    }

    /// Whether every captured file has been processed
    pub fn is_complete(&self) -> bool {
        self.processed_files == self.total_files
    }

    /// Time since the run started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Transferred bytes as a fraction of queued bytes, 0 when nothing is queued
    pub fn progress(&self) -> f64 {
        if self.total_bytes > 0 {
            self.transferred_bytes as f64 / self.total_bytes as f64
        } else {
            0.0
        }
    }

    /// Overall progress as a percentage
    pub fn progress_percent(&self) -> f64 {
        self.progress() * 100.0
    }

    /// Average throughput in bytes per second since the run started
    pub fn transfer_rate(&self) -> TransferRate {
        self.rate_over(self.elapsed())
    }

    /// Throughput over an explicit elapsed duration, 0 when it is zero
    pub fn rate_over(&self, elapsed: Duration) -> TransferRate {
        if elapsed.as_secs_f64() > 0.0 {
            self.transferred_bytes as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Final outcome of a device run, handed to the notifier
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Identifier of the run
    pub run_id: RunId,
    /// The processed device
    pub device: Device,
    /// Final statistics snapshot
    pub stats: TransferStats,
    /// Where the run's logs were written, if anywhere
    pub log_location: Option<PathBuf>,
}
