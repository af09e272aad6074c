//! Validated configuration scalars shared by the config loader and the engine

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Size of a transfer worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkerCount(usize);

impl WorkerCount {
    /// Minimum worker count
    pub const MIN: usize = 1;
    /// Maximum worker count
    pub const MAX: usize = 256;

    /// Create a new worker count with validation
    pub fn new(count: usize) -> Result<Self, String> {
        if count < Self::MIN {
            Err(format!("Worker count {} is below minimum {}", count, Self::MIN))
        } else if count > Self::MAX {
            Err(format!("Worker count {} exceeds maximum {}", count, Self::MAX))
        } else {
            Ok(Self(count))
        }
    }

    /// Clamp any requested count into the valid range
    pub fn clamped(count: usize) -> Self {
        Self(count.clamp(Self::MIN, Self::MAX))
    }

    /// Get the worker count value
    pub fn get(self) -> usize {
        self.0
    }

    /// Worker count matching the available parallelism
    pub fn optimal() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self(cpu_count.min(Self::MAX))
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        Self::optimal()
    }
}

/// Digest used to verify copies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ChecksumAlgorithm {
    /// SHA-256
    #[default]
    Sha256,
    /// BLAKE3
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!(
                "Unknown checksum algorithm '{}'. Must be 'sha256' or 'blake3'",
                other
            )),
        }
    }
}

/// Per-file retry policy with exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Result<Self, String> {
        if backoff_multiplier < 1.0 {
            return Err("Backoff multiplier must be at least 1.0".to_string());
        }
        if initial_delay > max_delay {
            return Err("Initial delay cannot be greater than max delay".to_string());
        }
        Ok(Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        })
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Calculate the delay before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Settings consumed by the classifier and the transfer engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Root directory every destination is resolved under
    pub destination_root: PathBuf,
    /// Classification regex with exactly four capture groups
    pub pattern: String,
    /// Directory template using `{client}`, `{project}` and `{camera}`
    pub folder_template: String,
    /// Folder for files whose names do not match the pattern
    pub unmatched_folder: String,
    /// Size of the worker pool
    pub workers: WorkerCount,
    /// Copy buffer size in bytes
    pub buffer_size: usize,
    /// Re-read and compare digests after each copy
    pub verify_checksums: bool,
    /// Digest used when verifying
    pub checksum_algorithm: ChecksumAlgorithm,
    /// Literal file name prefixes that put a file in the priority tier
    pub priority_prefixes: Vec<String>,
    /// Per-file retry policy
    pub retry: RetryConfig,
}

impl EngineSettings {
    /// Pattern used when none is configured
    pub const DEFAULT_PATTERN: &'static str = r"^([^_]+)_([^_]+)_([^_]+)_(.+)$";
    /// Folder template used when none is configured
    pub const DEFAULT_FOLDER_TEMPLATE: &'static str = "{client}/{project}/{camera}";
    /// Fallback folder used when none is configured
    pub const DEFAULT_UNMATCHED_FOLDER: &'static str = "Unsorted";

    /// Settings with defaults for everything except the destination root
    pub fn new<P: Into<PathBuf>>(destination_root: P) -> Self {
        Self {
            destination_root: destination_root.into(),
            pattern: Self::DEFAULT_PATTERN.to_string(),
            folder_template: Self::DEFAULT_FOLDER_TEMPLATE.to_string(),
            unmatched_folder: Self::DEFAULT_UNMATCHED_FOLDER.to_string(),
            workers: WorkerCount::default(),
            buffer_size: 1024 * 1024,
            verify_checksums: true,
            checksum_algorithm: ChecksumAlgorithm::default(),
            priority_prefixes: Vec::new(),
            retry: RetryConfig::default(),
        }
    }
}

/// Inclusion policy applied to discovered devices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DevicePolicy {
    /// Devices smaller than this are ignored
    pub min_size_bytes: u64,
    /// Filesystem allow-list, compared case-insensitively; empty allows all
    pub allowed_filesystems: Vec<String>,
    /// Devices whose raw path contains any of these substrings are ignored
    pub exclude_patterns: Vec<String>,
}

/// Settings for the platform device detectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorSettings {
    /// Whether the detector may mount devices itself
    pub auto_mount: bool,
    /// Directory under which devices are mounted
    pub mount_base: PathBuf,
    /// Interval between device polls
    pub poll_interval: Duration,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            auto_mount: true,
            mount_base: PathBuf::from("/media/ingest"),
            poll_interval: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_worker_count_bounds() {
        assert!(WorkerCount::new(0).is_err());
        assert!(WorkerCount::new(1).is_ok());
        assert!(WorkerCount::new(257).is_err());
        assert_eq!(WorkerCount::clamped(0).get(), 1);
        assert_eq!(WorkerCount::clamped(1000).get(), WorkerCount::MAX);
    }

    #[rstest]
    #[case("sha256", ChecksumAlgorithm::Sha256)]
    #[case("SHA256", ChecksumAlgorithm::Sha256)]
    #[case("blake3", ChecksumAlgorithm::Blake3)]
    fn test_checksum_algorithm_parse(#[case] input: &str, #[case] expected: ChecksumAlgorithm) {
        assert_eq!(input.parse::<ChecksumAlgorithm>().unwrap(), expected);
    }

    #[test]
    fn test_checksum_algorithm_rejects_unknown() {
        assert!("md5".parse::<ChecksumAlgorithm>().is_err());
    }

    #[test]
    fn test_retry_backoff_is_capped() {
        let retry = RetryConfig::new(
            5,
            Duration::from_millis(100),
            Duration::from_millis(350),
            2.0,
        )
        .unwrap();

        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(retry.delay_for_attempt(6), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_validation() {
        assert!(RetryConfig::new(1, Duration::from_secs(2), Duration::from_secs(1), 2.0).is_err());
        assert!(RetryConfig::new(1, Duration::ZERO, Duration::ZERO, 0.5).is_err());
        assert_eq!(RetryConfig::none().max_retries, 0);
    }

    #[test]
    fn test_engine_settings_defaults() {
        let settings = EngineSettings::new("/mnt/storage");
        assert_eq!(settings.destination_root, PathBuf::from("/mnt/storage"));
        assert_eq!(settings.unmatched_folder, "Unsorted");
        assert!(settings.verify_checksums);
        assert_eq!(settings.retry.max_retries, 0);
        assert!(settings.priority_prefixes.is_empty());
    }
}
