//! Console output for the mediaingest CLI

use console::style;
use ingest_engine::{format_size, Rejection};
use ingest_types::{Device, TransferStats};
use serde::Serialize;

/// One row of `mediaingest devices --json`
#[derive(Debug, Serialize)]
struct DeviceRow<'a> {
    #[serde(flatten)]
    device: &'a Device,
    ingest: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

/// Devices with their policy verdicts as pretty JSON
pub fn devices_json(devices: &[(Device, Result<(), Rejection>)]) -> serde_json::Result<String> {
    let rows: Vec<DeviceRow<'_>> = devices
        .iter()
        .map(|(device, verdict)| DeviceRow {
            device,
            ingest: verdict.is_ok(),
            reason: verdict.as_ref().err().map(ToString::to_string),
        })
        .collect();
    serde_json::to_string_pretty(&rows)
}

/// Print devices with their policy verdicts
pub fn print_devices(devices: &[(Device, Result<(), Rejection>)]) {
    if devices.is_empty() {
        println!("{} No removable devices found", style("ℹ").yellow());
        return;
    }

    println!("{}", style("Removable devices:").bold().underlined());
    for (device, verdict) in devices {
        let mount = device
            .mount_path
            .as_ref()
            .map_or_else(|| "not mounted".to_string(), |p| p.display().to_string());
        println!(
            "  {} {} [{}, {}] {}",
            style(&device.name).cyan().bold(),
            device.path.display(),
            if device.filesystem.is_empty() { "?" } else { &device.filesystem },
            format_size(device.size),
            style(mount).dim()
        );
        match verdict {
            Ok(()) => println!("    {} would be ingested", style("✓").green()),
            Err(reason) => println!("    {} skipped: {}", style("✗").yellow(), reason),
        }
    }
}

/// Print the end-of-run statistics
pub fn print_run_summary(device_name: &str, stats: &TransferStats) {
    println!();
    println!(
        "{}",
        style(format!("Ingest Summary - {}", device_name))
            .bold()
            .underlined()
    );
    println!("  Started: {}", stats.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Total files: {}", stats.total_files);
    println!("  Transferred: {}", style(stats.succeeded_files()).green());
    println!(
        "  Failed: {}",
        if stats.failed_files > 0 {
            style(stats.failed_files).red()
        } else {
            style(stats.failed_files).green()
        }
    );
    println!(
        "  Bytes: {} of {}",
        style(format_size(stats.transferred_bytes)).green(),
        format_size(stats.total_bytes)
    );
    println!("  Duration: {}", style(format_duration(stats.elapsed())).blue());
    println!(
        "  Average speed: {}/s",
        style(format_size(stats.transfer_rate() as u64)).blue()
    );
}

fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
