//! Device lifecycle: inclusion policy, mounting and per-device runs

use crate::classifier::Classifier;
use crate::engine::TransferEngine;
use ingest_types::{
    Device, DeviceDetector, DevicePolicy, EngineSettings, Error, Notifier, Result, RunReport,
    TransferStats,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info, info_span, Instrument};
use walkdir::WalkDir;

/// Why a device was not ingested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Smaller than the configured minimum
    TooSmall {
        /// Device size
        size: u64,
        /// Configured minimum
        minimum: u64,
    },
    /// Filesystem not in the allow-list
    Filesystem(String),
    /// Path matched an exclude pattern
    Excluded(String),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooSmall { size, minimum } => {
                write!(f, "size {} below minimum {}", size, minimum)
            }
            Self::Filesystem(fs) => write!(f, "filesystem '{}' not allowed", fs),
            Self::Excluded(pattern) => write!(f, "path matches exclude pattern '{}'", pattern),
        }
    }
}

/// Check `device` against `policy`
pub fn check_policy(policy: &DevicePolicy, device: &Device) -> std::result::Result<(), Rejection> {
    if device.size < policy.min_size_bytes {
        return Err(Rejection::TooSmall {
            size: device.size,
            minimum: policy.min_size_bytes,
        });
    }

    let filesystem = device.filesystem.to_lowercase();
    if !policy.allowed_filesystems.is_empty()
        && !policy
            .allowed_filesystems
            .iter()
            .any(|fs| fs.to_lowercase() == filesystem)
    {
        return Err(Rejection::Filesystem(device.filesystem.clone()));
    }

    let path = device.path.to_string_lossy();
    if let Some(pattern) = policy
        .exclude_patterns
        .iter()
        .find(|pattern| path.contains(pattern.as_str()))
    {
        return Err(Rejection::Excluded(pattern.clone()));
    }

    Ok(())
}

/// Every regular file under `root`, in a stable order
///
/// Any walk error aborts the scan.
pub async fn scan_files(root: &Path) -> Result<Vec<PathBuf>> {
    let owned = root.to_path_buf();
    let walk = tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in WalkDir::new(&owned).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Scan {
                path: owned.clone(),
                message: e.to_string(),
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    });

    walk.await.map_err(|e| Error::Scan {
        path: root.to_path_buf(),
        message: e.to_string(),
    })?
}

type ActiveSet = Arc<RwLock<HashMap<String, Device>>>;

/// Removes a device from the active set when dropped
struct ActiveGuard {
    active: ActiveSet,
    name: String,
}

impl ActiveGuard {
    fn register(active: &ActiveSet, device: &Device) -> Self {
        active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.name.clone(), device.clone());
        Self {
            active: Arc::clone(active),
            name: device.name.clone(),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

/// Decides which devices to ingest and drives each device's run
///
/// Devices are independent: each run gets its own [`TransferEngine`] and a
/// failure on one device never touches another.
pub struct DeviceManager {
    detector: Arc<dyn DeviceDetector>,
    notifier: Arc<dyn Notifier>,
    policy: DevicePolicy,
    settings: Arc<EngineSettings>,
    classifier: Arc<Classifier>,
    active: ActiveSet,
    log_location: Option<PathBuf>,
}

impl DeviceManager {
    /// Create a manager, compiling the classifier from `settings`
    pub fn new(
        detector: Arc<dyn DeviceDetector>,
        notifier: Arc<dyn Notifier>,
        policy: DevicePolicy,
        settings: EngineSettings,
    ) -> Result<Self> {
        let classifier = Arc::new(Classifier::new(&settings)?);
        Ok(Self {
            detector,
            notifier,
            policy,
            settings: Arc::new(settings),
            classifier,
            active: Arc::new(RwLock::new(HashMap::new())),
            log_location: None,
        })
    }

    /// Log location passed along in run reports
    pub fn with_log_location<P: Into<PathBuf>>(mut self, location: P) -> Self {
        self.log_location = Some(location.into());
        self
    }

    /// The detector this manager mounts through
    pub fn detector(&self) -> &Arc<dyn DeviceDetector> {
        &self.detector
    }

    /// The inclusion policy
    pub fn policy(&self) -> &DevicePolicy {
        &self.policy
    }

    /// Whether `device` passes the inclusion policy
    pub fn evaluate(&self, device: &Device) -> bool {
        match check_policy(&self.policy, device) {
            Ok(()) => true,
            Err(reason) => {
                debug!("Skipping device {}: {}", device, reason);
                false
            }
        }
    }

    /// Mount `device` through the detector
    pub async fn mount(&self, device: &mut Device) -> Result<()> {
        match self.detector.mount(device).await {
            Ok(()) => {
                if let Some(mount_path) = &device.mount_path {
                    info!("Mounted {} at {}", device, mount_path.display());
                }
                Ok(())
            }
            Err(e @ Error::Mount { .. }) => Err(e),
            Err(e) => Err(Error::mount(device.name.clone(), e.to_string())),
        }
    }

    /// A fresh engine for one device run
    pub fn new_engine(&self) -> TransferEngine {
        TransferEngine::new(Arc::clone(&self.settings), Arc::clone(&self.classifier))
    }

    /// Ingest every file on a mounted device
    pub async fn process(&self, device: Device) -> Result<TransferStats> {
        let engine = self.new_engine();
        self.process_with_engine(device, &engine).await
    }

    /// [`DeviceManager::process`] with a caller-supplied engine, so the
    /// caller can watch its statistics while the run is in flight
    pub async fn process_with_engine(
        &self,
        device: Device,
        engine: &TransferEngine,
    ) -> Result<TransferStats> {
        let span = info_span!("device", name = %device.name);
        async move {
            let _active = ActiveGuard::register(&self.active, &device);
            let result = self.run(&device, engine).await;
            if let Err(e) = &result {
                error!("Processing device {} failed: {}", device, e);
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, device: &Device, engine: &TransferEngine) -> Result<TransferStats> {
        let mount_path = device.mount_path.as_deref().ok_or_else(|| Error::Scan {
            path: device.path.clone(),
            message: "device is not mounted".to_string(),
        })?;

        info!("Scanning {} at {}", device, mount_path.display());
        let files = scan_files(mount_path).await?;
        if files.is_empty() {
            info!("No files found on {}", device);
            return Ok(TransferStats::new());
        }
        info!("Found {} files on {}", files.len(), device);

        let stats = engine.transfer_files(&device.name, &files).await?;

        let report = RunReport {
            run_id: uuid::Uuid::new_v4(),
            device: device.clone(),
            stats: stats.clone(),
            log_location: self.log_location.clone(),
        };
        self.notifier.notify(&report);
        Ok(stats)
    }

    /// Devices currently being processed
    pub fn active_devices(&self) -> Vec<Device> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("policy", &self.policy)
            .field("settings", &self.settings)
            .field("log_location", &self.log_location)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn policy() -> DevicePolicy {
        DevicePolicy {
            min_size_bytes: GIB,
            allowed_filesystems: vec!["exfat".to_string(), "vfat".to_string()],
            exclude_patterns: vec!["/dev/sda".to_string()],
        }
    }

    #[rstest]
    #[case(Device::new("sdb1", "/dev/sdb1").with_filesystem("exfat").with_size(64 * GIB), true)]
    #[case(Device::new("sdb1", "/dev/sdb1").with_filesystem("EXFAT").with_size(64 * GIB), true)]
    #[case(Device::new("sdb1", "/dev/sdb1").with_filesystem("exfat").with_size(GIB - 1), false)]
    #[case(Device::new("sdb1", "/dev/sdb1").with_filesystem("ntfs").with_size(64 * GIB), false)]
    #[case(Device::new("sda1", "/dev/sda1").with_filesystem("vfat").with_size(64 * GIB), false)]
    fn test_policy(#[case] device: Device, #[case] allowed: bool) {
        assert_eq!(check_policy(&policy(), &device).is_ok(), allowed);
    }

    #[test]
    fn test_filesystem_match_folds_unicode_case() {
        let policy = DevicePolicy {
            allowed_filesystems: vec!["ÉXT4".to_string()],
            ..policy()
        };
        let device = Device::new("sdc1", "/dev/sdc1")
            .with_filesystem("éxt4")
            .with_size(2 * GIB);
        assert!(check_policy(&policy, &device).is_ok());
    }

    #[test]
    fn test_empty_allow_list_accepts_any_filesystem() {
        let policy = DevicePolicy {
            allowed_filesystems: Vec::new(),
            ..policy()
        };
        let device = Device::new("sdc1", "/dev/sdc1")
            .with_filesystem("btrfs")
            .with_size(2 * GIB);
        assert!(check_policy(&policy, &device).is_ok());
    }

    #[test]
    fn test_rejection_reason() {
        let device = Device::new("sdb1", "/dev/sdb1").with_filesystem("ntfs").with_size(0);
        assert_eq!(
            check_policy(&policy(), &device),
            Err(Rejection::TooSmall {
                size: 0,
                minimum: GIB
            })
        );
    }

    #[tokio::test]
    async fn test_scan_lists_regular_files_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("DCIM/100MEDIA/empty")).unwrap();
        std::fs::write(root.join("DCIM/100MEDIA/b.mp4"), b"b").unwrap();
        std::fs::write(root.join("DCIM/100MEDIA/a.mp4"), b"a").unwrap();
        std::fs::write(root.join("readme.txt"), b"r").unwrap();

        let files = scan_files(root).await.unwrap();
        assert_eq!(
            files,
            vec![
                root.join("DCIM/100MEDIA/a.mp4"),
                root.join("DCIM/100MEDIA/b.mp4"),
                root.join("readme.txt"),
            ]
        );
    }

    #[tokio::test]
    async fn test_scan_missing_root_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = scan_files(&temp_dir.path().join("gone")).await;
        assert!(matches!(result, Err(Error::Scan { .. })));
    }
}
