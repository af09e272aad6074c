//! Collaborator traits
//!
//! The ingest core is polymorphic over how devices are found and mounted and
//! over who hears about finished runs. Concrete adapters live in other crates.

use crate::{Device, Result, RunReport};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Callback invoked by a detector's watch loop for each newly seen device
pub type DeviceCallback = Arc<dyn Fn(Device) + Send + Sync>;

/// Platform capability for discovering, mounting and watching devices
#[async_trait]
pub trait DeviceDetector: Send + Sync {
    /// List the devices currently attached
    async fn detect_devices(&self) -> Result<Vec<Device>>;

    /// Mount a device, setting its mount path on success
    async fn mount(&self, device: &mut Device) -> Result<()>;

    /// Unmount a device, clearing its mount path
    async fn unmount(&self, device: &mut Device) -> Result<()>;

    /// Describe the device at a raw path
    async fn get_device_info(&self, path: &Path) -> Result<Device>;

    /// Start watching for devices
    ///
    /// `callback` fires once for each device already attached when the watch
    /// starts and once per later arrival.
    async fn watch_for_devices(&self, callback: DeviceCallback) -> Result<()>;

    /// Stop a running watch. No-op when not watching.
    async fn stop_watching(&self);
}

/// One-way sink for end-of-run reports
///
/// Implementations must not block the caller on delivery.
pub trait Notifier: Send + Sync {
    /// Deliver a report for a finished device run
    fn notify(&self, report: &RunReport);
}

/// Notifier that discards every report
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _report: &RunReport) {}
}
