//! Configuration management for mediaingest
//!
//! Configuration is layered: built-in defaults, then one file (YAML, TOML or
//! JSON), then `MEDIAINGEST__SECTION__KEY` environment overrides. The result is
//! normalised and validated before it is handed out.
//!
//! # Examples
//!
//! ```rust
//! use ingest_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .build()
//!     .expect("defaults are valid");
//!
//! let settings = config.engine_settings();
//! assert_eq!(settings.unmatched_folder, "Unsorted");
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use ingest_types::{
    ChecksumAlgorithm, DetectorSettings, DevicePolicy, EngineSettings, RetryConfig, WorkerCount,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Main configuration structure for mediaingest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory ingested files are organised under
    pub destination_path: PathBuf,
    /// Automatic mounting of detected devices
    pub auto_mount: AutoMountConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Transfer engine configuration
    pub transfer: TransferConfig,
    /// Filename classification
    pub parsing: ParsingConfig,
    /// Device discovery and inclusion policy
    pub device_detection: DeviceDetectionConfig,
    /// End-of-run notifications
    pub notification: NotificationConfig,
    /// Console display
    pub display: DisplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination_path: PathBuf::from("/mnt/storage"),
            auto_mount: AutoMountConfig::default(),
            logging: LoggingConfig::default(),
            transfer: TransferConfig::default(),
            parsing: ParsingConfig::default(),
            device_detection: DeviceDetectionConfig::default(),
            notification: NotificationConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl Config {
    /// Project the settings the classifier and transfer engine consume
    pub fn engine_settings(&self) -> EngineSettings {
        let initial_delay = Duration::from_millis(self.transfer.retry_delay_ms);
        EngineSettings {
            destination_root: self.destination_path.clone(),
            pattern: self.parsing.pattern.clone(),
            folder_template: self.parsing.folder_structure.clone(),
            unmatched_folder: self.parsing.unmatched_folder.clone(),
            workers: WorkerCount::clamped(self.transfer.max_workers),
            buffer_size: self.transfer.buffer_size,
            verify_checksums: self.transfer.verify_checksums,
            checksum_algorithm: self.transfer.checksum_algorithm,
            priority_prefixes: self.transfer.priority_prefixes.clone(),
            retry: RetryConfig {
                max_retries: self.transfer.max_retries,
                initial_delay,
                max_delay: initial_delay.max(Duration::from_secs(30)),
                backoff_multiplier: 2.0,
            },
        }
    }

    /// Project the device inclusion policy
    pub fn device_policy(&self) -> DevicePolicy {
        DevicePolicy {
            min_size_bytes: self.device_detection.min_size_bytes,
            allowed_filesystems: self.device_detection.allowed_filesystems.clone(),
            exclude_patterns: self.device_detection.exclude_patterns.clone(),
        }
    }

    /// Project the settings the platform detectors consume
    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            auto_mount: self.auto_mount.enabled,
            mount_base: self.auto_mount.mount_base.clone(),
            poll_interval: Duration::from_millis(self.device_detection.poll_interval_ms),
        }
    }

    /// Delay between a device appearing and its evaluation
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.device_detection.settle_delay_ms)
    }

    /// Replace out-of-range values that have a sensible fallback
    pub fn normalize(&mut self) {
        if self.transfer.max_workers < 1 {
            self.transfer.max_workers = 1;
        }
        if self.transfer.buffer_size < 1024 {
            self.transfer.buffer_size = TransferConfig::DEFAULT_BUFFER_SIZE;
        }
    }
}

/// Automatic mounting of detected devices
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoMountConfig {
    /// Mount devices that are not mounted yet
    pub enabled: bool,
    /// Directory devices are mounted under
    pub mount_base: PathBuf,
}

impl Default for AutoMountConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mount_base: PathBuf::from("/media/ingest"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Directory for daily log files, console only when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Transfer engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Number of concurrent copy workers
    pub max_workers: usize,
    /// Copy buffer size in bytes
    pub buffer_size: usize,
    /// Verify each copy by re-reading the destination
    pub verify_checksums: bool,
    /// Digest used for verification
    pub checksum_algorithm: ChecksumAlgorithm,
    /// Extra attempts per failed file
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub retry_delay_ms: u64,
    /// File name prefixes transferred first
    pub priority_prefixes: Vec<String>,
}

impl TransferConfig {
    /// Buffer size used when none or a too-small one is configured
    pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            verify_checksums: true,
            checksum_algorithm: ChecksumAlgorithm::Sha256,
            max_retries: 0,
            retry_delay_ms: 500,
            priority_prefixes: Vec::new(),
        }
    }
}

/// Filename classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    /// Regex with exactly four capture groups: project, client, camera, clip
    pub pattern: String,
    /// Directory template with `{client}`, `{project}` and `{camera}`
    pub folder_structure: String,
    /// Folder for files that do not match
    pub unmatched_folder: String,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            pattern: EngineSettings::DEFAULT_PATTERN.to_string(),
            folder_structure: EngineSettings::DEFAULT_FOLDER_TEMPLATE.to_string(),
            unmatched_folder: EngineSettings::DEFAULT_UNMATCHED_FOLDER.to_string(),
        }
    }
}

/// Device discovery and inclusion policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceDetectionConfig {
    /// Watch for new devices in service mode
    pub enabled: bool,
    /// Minimum device size in bytes
    pub min_size_bytes: u64,
    /// Filesystem allow-list, empty allows all
    pub allowed_filesystems: Vec<String>,
    /// Substrings of device paths to ignore
    pub exclude_patterns: Vec<String>,
    /// Interval between device polls in milliseconds
    pub poll_interval_ms: u64,
    /// Wait after a device appears before touching it, in milliseconds
    pub settle_delay_ms: u64,
}

impl Default for DeviceDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size_bytes: 1024 * 1024 * 1024,
            allowed_filesystems: vec![
                "exfat".to_string(),
                "vfat".to_string(),
                "ntfs".to_string(),
                "ext4".to_string(),
            ],
            exclude_patterns: Vec::new(),
            poll_interval_ms: 2000,
            settle_delay_ms: 2000,
        }
    }
}

/// End-of-run notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Emit a completion summary for every device run
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Console display
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show a progress bar during one-shot ingests
    pub show_progress: bool,
    /// Progress refresh interval in milliseconds
    pub progress_interval_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_progress: true,
            progress_interval_ms: 250,
        }
    }
}
