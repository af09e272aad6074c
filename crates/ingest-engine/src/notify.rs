//! End-of-run notifiers

use ingest_types::{Notifier, RunReport, TransferStats};
use std::fmt::Write;
use std::time::Duration;
use tracing::info;

/// Notifier that writes the completion summary to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, report: &RunReport) {
        let summary = format_summary(&report.device.name, &report.stats, report.stats.elapsed());
        match &report.log_location {
            Some(location) => info!(
                run_id = %report.run_id,
                log_location = %location.display(),
                "{}",
                summary
            ),
            None => info!(run_id = %report.run_id, "{}", summary),
        }
    }
}

/// Human-readable completion summary for one device run
pub fn format_summary(device_name: &str, stats: &TransferStats, elapsed: Duration) -> String {
    let mut out = String::new();
    let secs = elapsed.as_secs();
    let average = if secs > 0 {
        stats.transferred_bytes / secs
    } else {
        stats.transferred_bytes
    };

    let _ = writeln!(out, "Media Ingest Complete - {}", device_name);
    let _ = writeln!(out, "{}", "=".repeat(50));
    let _ = writeln!(out);
    let _ = writeln!(out, "Transfer Summary:");
    let _ = writeln!(out, "  Device: {}", device_name);
    let _ = writeln!(out, "  Total Files: {}", stats.total_files);
    let _ = writeln!(out, "  Successfully Transferred: {}", stats.succeeded_files());
    let _ = writeln!(out, "  Failed: {}", stats.failed_files);
    let _ = writeln!(out, "  Total Size: {}", format_size(stats.total_bytes));
    let _ = writeln!(out, "  Duration: {}", format_duration(elapsed));
    let _ = write!(out, "  Average Speed: {}/s", format_size(average));
    out
}

/// Format a byte count with binary units ("512 B", "1.50 KB", "2.00 GB")
pub fn format_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    const UNITS: [&str; 6] = ["KB", "MB", "GB", "TB", "PB", "EB"];

    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.2} {}", bytes as f64 / div as f64, UNITS[exp])
}

/// Format a duration rounded to whole seconds ("45s", "1m5s", "2h0m3s")
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs() + u64::from(elapsed.subsec_millis() >= 500);
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
