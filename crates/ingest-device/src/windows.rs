//! Windows device detection through removable drive letters

use crate::detector::PollingWatcher;
use async_trait::async_trait;
use ingest_types::{DetectorSettings, Device, DeviceCallback, DeviceDetector, Error, Result};
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr;
use tracing::{debug, info};
use winapi::shared::minwindef::{DWORD, FALSE};
use winapi::shared::ntdef::ULARGE_INTEGER;
use winapi::um::fileapi::{
    GetDiskFreeSpaceExW, GetDriveTypeW, GetLogicalDrives, GetVolumeInformationW,
};
use winapi::um::winbase::DRIVE_REMOVABLE;

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

fn from_wide(buffer: &[u16]) -> String {
    String::from_utf16_lossy(buffer)
        .trim_end_matches('\0')
        .to_string()
}

/// Normalise `E:`, `E:\` or any path on the drive to the drive root `E:\`
fn drive_root(path: &Path) -> Result<String> {
    let root = path
        .ancestors()
        .last()
        .map(|root| root.to_string_lossy().to_string())
        .ok_or_else(|| Error::device_detection("Cannot determine root path"))?;
    if root.ends_with('\\') {
        Ok(root)
    } else {
        Ok(format!("{}\\", root))
    }
}

fn describe_drive(root: &str) -> Device {
    let root_wide = wide(root);
    let name = root.trim_end_matches('\\').to_string();
    let mut device = Device::new(name, root);

    let mut volume_name = vec![0u16; 261];
    let mut filesystem_name = vec![0u16; 261];
    let mut serial_number: DWORD = 0;
    let mut max_component_length: DWORD = 0;
    let mut filesystem_flags: DWORD = 0;

    let volume_result = unsafe {
        GetVolumeInformationW(
            root_wide.as_ptr(),
            volume_name.as_mut_ptr(),
            volume_name.len() as DWORD,
            &mut serial_number,
            &mut max_component_length,
            &mut filesystem_flags,
            filesystem_name.as_mut_ptr(),
            filesystem_name.len() as DWORD,
        )
    };
    if volume_result != FALSE {
        device.label = from_wide(&volume_name);
        device.filesystem = from_wide(&filesystem_name);
    } else {
        debug!("No volume information for {}", root);
    }

    let mut total_bytes: ULARGE_INTEGER = unsafe { std::mem::zeroed() };
    let space_result = unsafe {
        GetDiskFreeSpaceExW(
            root_wide.as_ptr(),
            ptr::null_mut(),
            &mut total_bytes,
            ptr::null_mut(),
        )
    };
    if space_result != FALSE {
        device.size = unsafe { *total_bytes.QuadPart() };
    }

    device
}

/// Enumerate removable drive letters
pub fn list_removable_drives() -> Vec<Device> {
    let mask = unsafe { GetLogicalDrives() };
    (0..26u32)
        .filter(|bit| mask & (1 << bit) != 0)
        .filter_map(|bit| char::from_u32(u32::from('A') + bit))
        .map(|letter| format!("{}:\\", letter))
        .filter(|root| unsafe { GetDriveTypeW(wide(root).as_ptr()) } == DRIVE_REMOVABLE)
        .map(|root| describe_drive(&root))
        .collect()
}

async fn probe_drives() -> Result<Vec<Device>> {
    tokio::task::spawn_blocking(list_removable_drives)
        .await
        .map_err(|e| Error::device_detection(format!("Drive enumeration failed: {}", e)))
}

/// Device detector for removable drive letters
pub struct WindowsDetector {
    watcher: PollingWatcher,
}

impl WindowsDetector {
    /// Create a detector with the given settings
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            watcher: PollingWatcher::new(settings.poll_interval),
        }
    }
}

#[async_trait]
impl DeviceDetector for WindowsDetector {
    async fn detect_devices(&self) -> Result<Vec<Device>> {
        probe_drives().await
    }

    async fn mount(&self, device: &mut Device) -> Result<()> {
        tokio::fs::metadata(&device.path).await.map_err(|e| {
            Error::mount(device.name.clone(), format!("drive not accessible: {}", e))
        })?;
        device.mount_path = Some(device.path.clone());
        info!("Drive {} ready at {}", device.name, device.path.display());
        Ok(())
    }

    async fn unmount(&self, device: &mut Device) -> Result<()> {
        info!("Drive {} can be safely removed", device.name);
        device.mount_path = None;
        Ok(())
    }

    async fn get_device_info(&self, path: &Path) -> Result<Device> {
        let root = drive_root(path)?;
        tokio::task::spawn_blocking(move || describe_drive(&root))
            .await
            .map_err(|e| Error::device_detection(format!("Drive query failed: {}", e)))
    }

    async fn watch_for_devices(&self, callback: DeviceCallback) -> Result<()> {
        self.watcher.start(probe_drives, callback).await
    }

    async fn stop_watching(&self) {
        self.watcher.stop().await;
    }
}

/// Describe the drive that contains `path`
pub async fn volume_for(path: &Path) -> Result<(PathBuf, Device)> {
    let root = drive_root(path)?;
    let lookup = root.clone();
    let device = tokio::task::spawn_blocking(move || describe_drive(&lookup))
        .await
        .map_err(|e| Error::device_detection(format!("Drive query failed: {}", e)))?;
    Ok((PathBuf::from(root), device))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_root_normalisation() {
        assert_eq!(drive_root(Path::new("E:\\DCIM\\clip.mp4")).unwrap(), "E:\\");
        assert_eq!(drive_root(Path::new("E:\\")).unwrap(), "E:\\");
    }

    #[tokio::test]
    async fn test_enumeration_does_not_fail() {
        let detector = WindowsDetector::new(DetectorSettings::default());
        let devices = detector.detect_devices().await.unwrap();
        assert!(devices.iter().all(|device| device.path.to_string_lossy().ends_with('\\')));
    }
}
