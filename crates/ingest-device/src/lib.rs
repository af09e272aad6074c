//! Removable device detection for mediaingest
//!
//! Platform adapters behind the [`DeviceDetector`] trait:
//!
//! - **Linux**: `lsblk` for discovery, `mount`/`umount` for mounting,
//!   `/proc/mounts` for locating already-mounted directories
//! - **Windows**: removable drive letters through the Win32 volume APIs
//!
//! Both adapters watch for new devices with the same polling loop
//! ([`PollingWatcher`]). [`platform_detector`] picks the adapter for the
//! current platform at process start.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ingest_device::platform_detector;
//! use ingest_types::DetectorSettings;
//!
//! # tokio_test::block_on(async {
//! let detector = platform_detector(DetectorSettings::default());
//! for device in detector.detect_devices().await? {
//!     println!("{} ({} bytes, {})", device, device.size, device.filesystem);
//! }
//! # Ok::<(), ingest_types::Error>(())
//! # });
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod detector;

#[cfg(windows)]
pub mod windows;

#[cfg(not(windows))]
pub mod unix;

pub use detector::{new_arrivals, PollingWatcher};
pub use ingest_types::DeviceDetector;

use ingest_types::{DetectorSettings, Device, Result};
use std::path::Path;
use std::sync::Arc;

/// Select the detector for the platform this process runs on
pub fn platform_detector(settings: DetectorSettings) -> Arc<dyn DeviceDetector> {
    #[cfg(windows)]
    {
        Arc::new(windows::WindowsDetector::new(settings))
    }
    #[cfg(not(windows))]
    {
        Arc::new(unix::LinuxDetector::new(settings))
    }
}

/// Build a mounted [`Device`] for a directory that is already accessible
///
/// The returned device is rooted at `path` itself, so only that subtree is
/// ingested. Identity fields come from the volume that contains it.
pub async fn describe_directory(path: &Path) -> Result<Device> {
    let dir_name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    #[cfg(windows)]
    {
        let (_, volume) = windows::volume_for(path).await?;
        Ok(Device {
            name: dir_name,
            mount_path: Some(path.to_path_buf()),
            ..volume
        })
    }

    #[cfg(not(windows))]
    {
        let mount = unix::mount_point_for(path).await?;
        Ok(Device::new(dir_name, mount.device)
            .with_filesystem(mount.fs_type)
            .with_mount_path(path))
    }
}
