//! Service-mode device watching
//!
//! Connects the detector's watch loop to the lifecycle manager. Each arriving
//! device runs on its own task: settle, evaluate, mount, process.

use crate::lifecycle::DeviceManager;
use ingest_types::{Device, DeviceCallback, Result};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Watches for devices and ingests each one that passes the policy
pub struct DeviceWatcher {
    manager: Arc<DeviceManager>,
    settle_delay: Duration,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl DeviceWatcher {
    /// Create a watcher that waits `settle_delay` after each arrival
    pub fn new(manager: Arc<DeviceManager>, settle_delay: Duration) -> Self {
        Self {
            manager,
            settle_delay,
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The manager devices are handed to
    pub fn manager(&self) -> &Arc<DeviceManager> {
        &self.manager
    }

    /// Start watching; attached devices are picked up by the same watch
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(&self) -> Result<()> {
        let handle = Handle::current();
        let manager = Arc::clone(&self.manager);
        let tasks = Arc::clone(&self.tasks);
        let settle_delay = self.settle_delay;

        let callback: DeviceCallback = Arc::new(move |device: Device| {
            let task = handle.spawn(handle_arrival(Arc::clone(&manager), device, settle_delay));
            let mut tasks = tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.retain(|task| !task.is_finished());
            tasks.push(task);
        });

        self.manager
            .detector()
            .watch_for_devices(callback)
            .await?;
        info!("Device watcher started");
        Ok(())
    }

    /// Stop the detector's watch loop. In-flight device runs keep going.
    pub async fn stop(&self) {
        self.manager.detector().stop_watching().await;
        info!("Device watcher stopped");
    }

    /// Wait until every device run started so far has finished
    pub async fn wait_idle(&self) {
        loop {
            let pending: Vec<JoinHandle<()>> = {
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                tasks.drain(..).collect()
            };
            if pending.is_empty() {
                return;
            }
            for result in futures::future::join_all(pending).await {
                if let Err(e) = result {
                    error!("Device task ended abnormally: {}", e);
                }
            }
        }
    }
}

impl std::fmt::Debug for DeviceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceWatcher")
            .field("manager", &self.manager)
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}

async fn handle_arrival(manager: Arc<DeviceManager>, mut device: Device, settle_delay: Duration) {
    if !settle_delay.is_zero() {
        tokio::time::sleep(settle_delay).await;
    }

    if !manager.evaluate(&device) {
        return;
    }

    if !device.is_mounted() {
        if let Err(e) = manager.mount(&mut device).await {
            error!("{}", e);
            return;
        }
    }

    // Errors are already logged inside the device span
    let _ = manager.process(device).await;
}
