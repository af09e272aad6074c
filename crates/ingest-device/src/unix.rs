//! Linux device detection through `lsblk`, `mount` and `/proc/mounts`

use crate::detector::PollingWatcher;
use async_trait::async_trait;
use ingest_types::{
    DetectorSettings, Device, DeviceCallback, DeviceDetector, Error, Result,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

const LSBLK_COLUMNS: &str = "NAME,PATH,SIZE,TYPE,MOUNTPOINT,FSTYPE,LABEL,RM";

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<LsblkDevice>,
}

/// util-linux prints booleans and sizes either as JSON scalars or as strings
/// depending on its version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LsblkScalar {
    Bool(bool),
    Number(u64),
    Text(String),
}

impl LsblkScalar {
    fn as_flag(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Number(value) => *value != 0,
            Self::Text(value) => value == "1" || value.eq_ignore_ascii_case("true"),
        }
    }

    fn as_size(&self) -> u64 {
        match self {
            Self::Bool(_) => 0,
            Self::Number(value) => *value,
            Self::Text(value) => value.trim().parse().unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    path: Option<String>,
    size: Option<LsblkScalar>,
    #[serde(rename = "type")]
    kind: Option<String>,
    mountpoint: Option<String>,
    fstype: Option<String>,
    label: Option<String>,
    rm: Option<LsblkScalar>,
    #[serde(default)]
    children: Vec<LsblkDevice>,
}

impl LsblkDevice {
    fn is_removable(&self) -> bool {
        self.rm.as_ref().is_some_and(LsblkScalar::as_flag)
    }

    fn to_device(&self) -> Device {
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| format!("/dev/{}", self.name));
        let mut device = Device::new(self.name.clone(), path)
            .with_filesystem(self.fstype.clone().unwrap_or_default())
            .with_size(self.size.as_ref().map_or(0, LsblkScalar::as_size))
            .with_label(self.label.clone().unwrap_or_default());
        if let Some(mountpoint) = self.mountpoint.as_deref().filter(|m| !m.is_empty()) {
            device = device.with_mount_path(mountpoint);
        }
        device
    }
}

fn flatten(devices: &[LsblkDevice], parent_removable: bool, out: &mut Vec<(Device, bool, bool)>) {
    for entry in devices {
        let removable = parent_removable || entry.is_removable();
        let has_filesystem = entry.fstype.as_deref().is_some_and(|fs| !fs.is_empty());
        let is_volume = matches!(entry.kind.as_deref(), Some("part" | "disk"));
        out.push((entry.to_device(), removable, has_filesystem && is_volume));
        flatten(&entry.children, removable, out);
    }
}

/// Parse `lsblk -J` output into every block device it lists
pub fn parse_lsblk(json: &str) -> Result<Vec<Device>> {
    Ok(parse_lsblk_entries(json)?
        .into_iter()
        .map(|(device, _, _)| device)
        .collect())
}

/// Parse `lsblk -J` output, keeping removable disks and partitions that carry a filesystem
pub fn parse_removable(json: &str) -> Result<Vec<Device>> {
    Ok(parse_lsblk_entries(json)?
        .into_iter()
        .filter(|(_, removable, ingestible)| *removable && *ingestible)
        .map(|(device, _, _)| device)
        .collect())
}

fn parse_lsblk_entries(json: &str) -> Result<Vec<(Device, bool, bool)>> {
    let output: LsblkOutput = serde_json::from_str(json)
        .map_err(|e| Error::device_detection(format!("Failed to parse lsblk output: {}", e)))?;
    let mut entries = Vec::new();
    flatten(&output.blockdevices, false, &mut entries);
    Ok(entries)
}

async fn run_lsblk(target: Option<&Path>) -> Result<String> {
    let mut command = Command::new("lsblk");
    command.args(["-J", "-b", "-o", LSBLK_COLUMNS]);
    if let Some(target) = target {
        command.arg(target);
    }

    let output = command
        .output()
        .await
        .map_err(|e| Error::device_detection(format!("Failed to run lsblk: {}", e)))?;
    if !output.status.success() {
        return Err(Error::device_detection(format!(
            "lsblk failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// List removable block devices that carry a filesystem
pub async fn list_removable_devices() -> Result<Vec<Device>> {
    let json = run_lsblk(None).await?;
    let devices = parse_removable(&json)?;
    debug!("lsblk reported {} removable volume(s)", devices.len());
    Ok(devices)
}

/// One entry of the kernel mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Mounted device (`/dev/sdb1`)
    pub device: String,
    /// Mount point
    pub mount_point: PathBuf,
    /// Filesystem type
    pub fs_type: String,
}

/// Decode the octal escapes the kernel uses for whitespace in mount paths
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(value) = u8::try_from(value) {
                    out.push(value);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parse the contents of `/proc/mounts`
pub fn parse_mounts(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let device = parts.next()?;
            let mount_point = parts.next()?;
            let fs_type = parts.next()?;
            Some(MountEntry {
                device: unescape_mount_field(device),
                mount_point: PathBuf::from(unescape_mount_field(mount_point)),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

/// The mount entry whose mount point is the longest prefix of `path`
pub fn best_mount<'a>(entries: &'a [MountEntry], path: &Path) -> Option<&'a MountEntry> {
    entries
        .iter()
        .filter(|entry| path.starts_with(&entry.mount_point))
        .max_by_key(|entry| entry.mount_point.as_os_str().len())
}

/// Find the mount that contains `path`
pub async fn mount_point_for(path: &Path) -> Result<MountEntry> {
    debug!("Getting mount info for path: {}", path.display());
    let content = tokio::fs::read_to_string("/proc/mounts")
        .await
        .map_err(|e| Error::device_detection(format!("Failed to read /proc/mounts: {}", e)))?;

    let entries = parse_mounts(&content);
    best_mount(&entries, path)
        .cloned()
        .ok_or_else(|| Error::device_detection("No mount point found for path"))
}

/// Device detector backed by util-linux
pub struct LinuxDetector {
    settings: DetectorSettings,
    watcher: PollingWatcher,
}

impl LinuxDetector {
    /// Create a detector with the given settings
    pub fn new(settings: DetectorSettings) -> Self {
        let watcher = PollingWatcher::new(settings.poll_interval);
        Self { settings, watcher }
    }

    async fn run(program: &str, args: &[&Path], device: &Device) -> Result<()> {
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::mount(device.name.clone(), format!("{}: {}", program, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::mount(
                device.name.clone(),
                format!(
                    "{} exited with {}: {}",
                    program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }
}

#[async_trait]
impl DeviceDetector for LinuxDetector {
    async fn detect_devices(&self) -> Result<Vec<Device>> {
        list_removable_devices().await
    }

    async fn mount(&self, device: &mut Device) -> Result<()> {
        if device.is_mounted() {
            return Ok(());
        }
        if !self.settings.auto_mount {
            return Err(Error::mount(device.name.clone(), "auto-mount is disabled"));
        }

        let mount_path = self.settings.mount_base.join(&device.name);
        tokio::fs::create_dir_all(&mount_path).await.map_err(|e| {
            Error::mount(
                device.name.clone(),
                format!("failed to create mount point {}: {}", mount_path.display(), e),
            )
        })?;

        Self::run("mount", &[device.path.as_path(), mount_path.as_path()], device).await?;

        info!("Mounted device {} at {}", device.name, mount_path.display());
        device.mount_path = Some(mount_path);
        Ok(())
    }

    async fn unmount(&self, device: &mut Device) -> Result<()> {
        let Some(mount_path) = device.mount_path.clone() else {
            return Ok(());
        };

        Self::run("umount", &[mount_path.as_path()], device).await?;

        info!("Unmounted device {} from {}", device.name, mount_path.display());
        device.mount_path = None;
        Ok(())
    }

    async fn get_device_info(&self, path: &Path) -> Result<Device> {
        let json = run_lsblk(Some(path)).await?;
        parse_lsblk(&json)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::device_detection(format!("No block device at {}", path.display()))
            })
    }

    async fn watch_for_devices(&self, callback: DeviceCallback) -> Result<()> {
        self.watcher.start(list_removable_devices, callback).await
    }

    async fn stop_watching(&self) {
        self.watcher.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const LSBLK_JSON: &str = r#"{
   "blockdevices": [
      {"name":"nvme0n1", "path":"/dev/nvme0n1", "size":512110190592, "type":"disk", "mountpoint":null, "fstype":null, "label":null, "rm":false,
         "children": [
            {"name":"nvme0n1p1", "path":"/dev/nvme0n1p1", "size":536870912, "type":"part", "mountpoint":"/boot/efi", "fstype":"vfat", "label":null, "rm":false}
         ]
      },
      {"name":"sdb", "path":"/dev/sdb", "size":"128043712512", "type":"disk", "mountpoint":null, "fstype":null, "label":null, "rm":"1",
         "children": [
            {"name":"sdb1", "path":"/dev/sdb1", "size":"128042663936", "type":"part", "mountpoint":"/media/ingest/sdb1", "fstype":"exfat", "label":"A001_CARD", "rm":"1"}
         ]
      },
      {"name":"sdc", "size":64021856256, "type":"disk", "mountpoint":null, "fstype":"vfat", "label":"CAM_B", "rm":true}
   ]
}"#;

    #[test]
    fn test_parse_removable_keeps_only_removable_volumes() {
        let devices = parse_removable(LSBLK_JSON).unwrap();
        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["sdb1", "sdc"]);

        let sdb1 = &devices[0];
        assert_eq!(sdb1.path, PathBuf::from("/dev/sdb1"));
        assert_eq!(sdb1.size, 128_042_663_936);
        assert_eq!(sdb1.filesystem, "exfat");
        assert_eq!(sdb1.label, "A001_CARD");
        assert_eq!(sdb1.mount_path, Some(PathBuf::from("/media/ingest/sdb1")));

        let sdc = &devices[1];
        assert_eq!(sdc.path, PathBuf::from("/dev/sdc"));
        assert!(!sdc.is_mounted());
    }

    #[test]
    fn test_parse_lsblk_lists_everything() {
        assert_eq!(parse_lsblk(LSBLK_JSON).unwrap().len(), 5);
        assert!(parse_lsblk("not json").is_err());
    }

    const PROC_MOUNTS: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
/dev/sdb1 /media/ingest/sdb1 exfat rw,nosuid,nodev 0 0
/dev/sdc1 /media/user/CARD\\040B vfat rw 0 0
";

    #[rstest]
    #[case("/media/ingest/sdb1/DCIM/clip.mp4", "/dev/sdb1")]
    #[case("/home/user/footage", "/dev/nvme0n1p2")]
    #[case("/media/user/CARD B/A001", "/dev/sdc1")]
    fn test_best_mount(#[case] path: &str, #[case] device: &str) {
        let entries = parse_mounts(PROC_MOUNTS);
        let entry = best_mount(&entries, Path::new(path)).unwrap();
        assert_eq!(entry.device, device);
    }

    #[test]
    fn test_parse_mounts_decodes_escapes() {
        let entries = parse_mounts(PROC_MOUNTS);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[3].mount_point, PathBuf::from("/media/user/CARD B"));
        assert_eq!(entries[3].fs_type, "vfat");
    }

    #[tokio::test]
    async fn test_mount_refused_when_auto_mount_disabled() {
        let detector = LinuxDetector::new(DetectorSettings {
            auto_mount: false,
            ..DetectorSettings::default()
        });
        let mut device = Device::new("sdb1", "/dev/sdb1");

        let result = detector.mount(&mut device).await;
        assert!(matches!(result, Err(Error::Mount { .. })));
        assert!(!device.is_mounted());
    }

    #[tokio::test]
    async fn test_unmount_without_mount_path_is_noop() {
        let detector = LinuxDetector::new(DetectorSettings::default());
        let mut device = Device::new("sdb1", "/dev/sdb1");
        detector.unmount(&mut device).await.unwrap();
    }
}
