//! Shared fixtures for mediaingest integration tests
//!
//! A scripted device detector, a notifier that records reports, and helpers
//! for building card and storage directories on disk.

use async_trait::async_trait;
use ingest_device::PollingWatcher;
use ingest_types::{
    Device, DeviceCallback, DeviceDetector, EngineSettings, Error, Notifier, Result, RunReport,
    WorkerCount,
};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Pattern used by the camera-card scenarios
pub const CAMERA_PATTERN: &str = r"^([^_]+)_([^_]+)_(ACam|BCam|CCam)_(.+)$";

/// Engine settings for the camera-card scenarios rooted at `storage`
pub fn camera_settings(storage: &Path, workers: usize) -> EngineSettings {
    let mut settings = EngineSettings::new(storage);
    settings.pattern = CAMERA_PATTERN.to_string();
    settings.folder_template = "{client}/{project}/{camera}".to_string();
    settings.unmatched_folder = "Unsorted".to_string();
    settings.workers = WorkerCount::clamped(workers);
    settings
}

/// Deterministic file content of `size` bytes seeded by `seed`
pub fn clip_bytes(size: usize, seed: u8) -> Vec<u8> {
    (0..size)
        .map(|i| ((i * 7 + 13) as u8).wrapping_add(seed))
        .collect()
}

/// A temporary workspace with a destination root and any number of cards
pub struct Workspace {
    temp_dir: TempDir,
    storage: PathBuf,
}

impl Workspace {
    /// Create a workspace with an empty destination root
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let storage = temp_dir.path().join("storage");
        fs::create_dir_all(&storage).expect("storage dir");
        Self { temp_dir, storage }
    }

    /// Destination root
    pub fn storage(&self) -> &Path {
        &self.storage
    }

    /// Create a card directory holding `files` (relative path, content)
    pub fn card(&self, name: &str, files: &[(&str, Vec<u8>)]) -> PathBuf {
        let root = self.temp_dir.path().join("cards").join(name);
        fs::create_dir_all(&root).expect("card dir");
        for (relative, content) in files {
            let path = root.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).expect("card subdir");
            }
            fs::write(&path, content).expect("card file");
        }
        root
    }

    /// Read a file under the destination root
    pub fn read(&self, relative: &str) -> Vec<u8> {
        fs::read(self.storage.join(relative)).expect("destination file")
    }

    /// Every file under the destination root, relative and sorted
    pub fn stored_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        collect_files(&self.storage, &self.storage, &mut files);
        files.sort();
        files
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}

/// Device detector driven entirely by the test
///
/// Watching polls the attached device list through a [`PollingWatcher`], so
/// [`MockDetector::attach`] during a watch is picked up like a hot-plug.
pub struct MockDetector {
    devices: Arc<Mutex<Vec<Device>>>,
    mount_points: Mutex<HashMap<String, PathBuf>>,
    failing_mounts: Mutex<HashSet<String>>,
    callback: Mutex<Option<DeviceCallback>>,
    mount_calls: Mutex<Vec<String>>,
    watcher: PollingWatcher,
}

impl MockDetector {
    /// Interval the watch loop polls the attached devices at
    pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

    /// Create an empty detector
    pub fn new() -> Self {
        Self {
            devices: Arc::new(Mutex::new(Vec::new())),
            mount_points: Mutex::new(HashMap::new()),
            failing_mounts: Mutex::new(HashSet::new()),
            callback: Mutex::new(None),
            mount_calls: Mutex::new(Vec::new()),
            watcher: PollingWatcher::new(Self::POLL_INTERVAL),
        }
    }

    /// Report `device` from `detect_devices` and from the next watch poll
    pub fn attach(&self, device: Device) {
        self.devices.lock().expect("devices").push(device);
    }

    /// Mount `name` at `path` when asked
    pub fn mount_at(&self, name: &str, path: &Path) {
        self.mount_points
            .lock()
            .expect("mount points")
            .insert(name.to_string(), path.to_path_buf());
    }

    /// Make mounting `name` fail
    pub fn fail_mount(&self, name: &str) {
        self.failing_mounts
            .lock()
            .expect("failing mounts")
            .insert(name.to_string());
    }

    /// Deliver `device` straight to the watch callback without attaching it
    ///
    /// Returns false when nothing is watching.
    pub fn arrive(&self, device: Device) -> bool {
        let callback = self.callback.lock().expect("callback").clone();
        match callback {
            Some(callback) => {
                callback(device);
                true
            }
            None => false,
        }
    }

    /// Whether a watch callback is registered
    pub fn is_watching(&self) -> bool {
        self.callback.lock().expect("callback").is_some()
    }

    /// Names passed to `mount`, in call order
    pub fn mount_calls(&self) -> Vec<String> {
        self.mount_calls.lock().expect("mount calls").clone()
    }
}

#[async_trait]
impl DeviceDetector for MockDetector {
    async fn detect_devices(&self) -> Result<Vec<Device>> {
        Ok(self.devices.lock().expect("devices").clone())
    }

    async fn mount(&self, device: &mut Device) -> Result<()> {
        self.mount_calls
            .lock()
            .expect("mount calls")
            .push(device.name.clone());

        if self
            .failing_mounts
            .lock()
            .expect("failing mounts")
            .contains(&device.name)
        {
            return Err(Error::device_detection(format!(
                "mount of {} refused",
                device.name
            )));
        }

        let mount_point = self
            .mount_points
            .lock()
            .expect("mount points")
            .get(&device.name)
            .cloned();
        match mount_point {
            Some(path) => {
                device.mount_path = Some(path);
                Ok(())
            }
            None => Err(Error::mount(device.name.clone(), "no mount point")),
        }
    }

    async fn unmount(&self, device: &mut Device) -> Result<()> {
        device.mount_path = None;
        Ok(())
    }

    async fn get_device_info(&self, path: &Path) -> Result<Device> {
        self.devices
            .lock()
            .expect("devices")
            .iter()
            .find(|device| device.path == path)
            .cloned()
            .ok_or_else(|| Error::device_detection(format!("unknown device {}", path.display())))
    }

    async fn watch_for_devices(&self, callback: DeviceCallback) -> Result<()> {
        let devices = Arc::clone(&self.devices);
        let probe = move || {
            let devices = Arc::clone(&devices);
            async move { Ok::<_, Error>(devices.lock().expect("devices").clone()) }
        };
        self.watcher.start(probe, Arc::clone(&callback)).await?;
        *self.callback.lock().expect("callback") = Some(callback);
        Ok(())
    }

    async fn stop_watching(&self) {
        self.watcher.stop().await;
        self.callback.lock().expect("callback").take();
    }
}

impl Default for MockDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Notifier that keeps every report it receives
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    reports: Mutex<Vec<RunReport>>,
}

impl RecordingNotifier {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far
    pub fn reports(&self) -> Vec<RunReport> {
        self.reports.lock().expect("reports").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, report: &RunReport) {
        self.reports.lock().expect("reports").push(report.clone());
    }
}

/// A removable device large enough for the default policy
pub fn card_device(name: &str) -> Device {
    Device::new(name, format!("/dev/{}", name))
        .with_filesystem("exfat")
        .with_size(64 * 1024 * 1024 * 1024)
        .with_label(name.to_uppercase())
}
