//! Polling device watcher shared by the platform detectors
//!
//! Neither platform gets hot-plug events here. Both detectors poll their
//! device listing on an interval and report paths that were not present in
//! the previous poll.

use ingest_types::{Device, DeviceCallback, Error, Result};
use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Devices in `current` whose paths were not in `seen`
///
/// `seen` is replaced by the paths in `current`, so a device that disappears
/// and comes back is reported again.
pub fn new_arrivals(seen: &mut HashSet<PathBuf>, current: Vec<Device>) -> Vec<Device> {
    let arrived: Vec<Device> = current
        .iter()
        .filter(|device| !seen.contains(&device.path))
        .cloned()
        .collect();

    *seen = current.into_iter().map(|device| device.path).collect();
    arrived
}

struct WatchHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Runs one polling loop at a time and stops it on request
pub struct PollingWatcher {
    interval: Duration,
    handle: Mutex<Option<WatchHandle>>,
}

impl PollingWatcher {
    /// Create a watcher polling every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            handle: Mutex::new(None),
        }
    }

    /// Poll interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a polling loop is running
    pub async fn is_watching(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Start polling with `probe`, calling `callback` once per new device
    ///
    /// The first poll runs before this returns and every device it lists is
    /// reported. Later polls report only devices missing from the previous one.
    pub async fn start<F, Fut>(&self, probe: F, callback: DeviceCallback) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Device>>> + Send + 'static,
    {
        let mut handle = self.handle.lock().await;
        if handle
            .as_ref()
            .is_some_and(|existing| !existing.task.is_finished())
        {
            return Err(Error::device_detection("already watching for devices"));
        }

        let mut seen = HashSet::new();
        match probe().await {
            Ok(devices) => {
                let attached = new_arrivals(&mut seen, devices);
                info!("Found {} attached devices", attached.len());
                for device in attached {
                    callback(device);
                }
            }
            Err(e) => warn!("Initial device poll failed: {}", e),
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match probe().await {
                            Ok(devices) => {
                                for device in new_arrivals(&mut seen, devices) {
                                    info!("New device detected: {}", device);
                                    callback(device);
                                }
                            }
                            Err(e) => warn!("Device poll failed: {}", e),
                        }
                    }
                }
            }
            debug!("Device polling loop stopped");
        });

        *handle = Some(WatchHandle { stop_tx, task });
        info!("Started watching for devices every {:?}", interval);
        Ok(())
    }

    /// Stop the polling loop and wait for it to exit. No-op when not watching.
    pub async fn stop(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(WatchHandle { stop_tx, task }) = handle {
            let _ = stop_tx.send(true);
            if let Err(e) = task.await {
                warn!("Device polling task ended abnormally: {}", e);
            }
            info!("Stopped watching for devices");
        }
    }
}
