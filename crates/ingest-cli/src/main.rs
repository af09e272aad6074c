//! mediaingest - automated ingest of removable camera media
//!
//! Watches for removable devices, classifies every file by its name and
//! copies it into an organised, verified destination tree.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use ingest_config::{Config, ConfigLoader};
use ingest_engine::{check_policy, DeviceManager, DeviceWatcher, LogNotifier};
use ingest_types::{Notifier, NullNotifier};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

mod display;
mod progress;

/// mediaingest - automated ingest of removable camera media
#[derive(Parser)]
#[command(
    name = "mediaingest",
    version = env!("CARGO_PKG_VERSION"),
    about = "Automated ingest of removable camera media",
    long_about = "mediaingest detects removable storage, classifies clips by file name\n\
                  and copies them concurrently into an organised destination tree,\n\
                  verifying every copy with a content digest."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch for devices and ingest each one as it arrives
    Watch,
    /// List attached removable devices and whether they would be ingested
    Devices {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ingest a mounted directory once
    Ingest {
        /// Directory to ingest, e.g. a card's mount point
        path: PathBuf,
        /// Override the destination root
        #[arg(long)]
        destination: Option<PathBuf>,
        /// Override the worker count
        #[arg(short, long)]
        workers: Option<usize>,
        /// Skip checksum verification
        #[arg(long)]
        no_verify: bool,
    },
    /// Show configuration
    Config {
        /// Show the default configuration instead of the effective one
        #[arg(long)]
        default: bool,
        /// Write the default configuration to a file
        #[arg(long, value_name = "FILE")]
        write: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { default, write } = &cli.command {
        return config_command(cli.config.as_deref(), *default, write.as_deref());
    }

    let config = ConfigLoader::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = init_logging(&cli, &config)?;

    info!(
        "mediaingest v{} starting ({} CPUs)",
        env!("CARGO_PKG_VERSION"),
        num_cpus::get()
    );

    match cli.command {
        Commands::Watch => watch_command(config).await,
        Commands::Devices { json } => devices_command(&config, json).await,
        Commands::Ingest {
            path,
            destination,
            workers,
            no_verify,
        } => {
            let mut config = config;
            if let Some(destination) = destination {
                config.destination_path = destination;
            }
            if let Some(workers) = workers {
                config.transfer.max_workers = workers.max(1);
            }
            if no_verify {
                config.transfer.verify_checksums = false;
            }
            ingest_command(config, &path, cli.quiet).await
        }
        Commands::Config { .. } => Ok(()),
    }
}

fn init_logging(cli: &Cli, config: &Config) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        config.logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log filter")?;

    let console = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let (file, guard) = match &config.logging.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "mediaingest.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(guard)
}

fn build_manager(config: &Config) -> Result<DeviceManager> {
    let detector = ingest_device::platform_detector(config.detector_settings());
    let notifier: Arc<dyn Notifier> = if config.notification.enabled {
        Arc::new(LogNotifier)
    } else {
        Arc::new(NullNotifier)
    };

    let manager = DeviceManager::new(
        detector,
        notifier,
        config.device_policy(),
        config.engine_settings(),
    )?;
    Ok(match &config.logging.log_dir {
        Some(dir) => manager.with_log_location(dir),
        None => manager,
    })
}

async fn watch_command(config: Config) -> Result<()> {
    if !config.device_detection.enabled {
        bail!("Device detection is disabled in the configuration");
    }

    let manager = Arc::new(build_manager(&config)?);
    let watcher = DeviceWatcher::new(manager, config.settle_delay());

    println!(
        "{} Watching for devices, ingesting into {}",
        style("→").green().bold(),
        style(config.destination_path.display()).cyan()
    );
    watcher.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");

    watcher.stop().await;
    let active = watcher.manager().active_devices();
    if !active.is_empty() {
        println!(
            "{} Waiting for {} device(s) to finish",
            style("…").yellow(),
            active.len()
        );
    }
    watcher.wait_idle().await;
    Ok(())
}

async fn devices_command(config: &Config, json: bool) -> Result<()> {
    let detector = ingest_device::platform_detector(config.detector_settings());
    let devices = detector.detect_devices().await?;
    let policy = config.device_policy();

    let verdicts: Vec<_> = devices
        .into_iter()
        .map(|device| {
            let verdict = check_policy(&policy, &device);
            (device, verdict)
        })
        .collect();

    if json {
        println!("{}", display::devices_json(&verdicts)?);
    } else {
        display::print_devices(&verdicts);
    }
    Ok(())
}

async fn ingest_command(config: Config, path: &Path, quiet: bool) -> Result<()> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Cannot access {}", path.display()))?;
    if !path.is_dir() {
        bail!("{} is not a directory", path.display());
    }

    let device = ingest_device::describe_directory(&path).await?;
    let manager = build_manager(&config)?;
    let engine = manager.new_engine();

    if !quiet {
        println!(
            "{} Ingesting {} into {}",
            style("→").green().bold(),
            style(path.display()).cyan(),
            style(config.destination_path.display()).cyan()
        );
    }

    let progress = (!quiet && config.display.show_progress).then(|| {
        progress::IngestProgress::start(
            engine.stats(),
            Duration::from_millis(config.display.progress_interval_ms.max(50)),
        )
    });

    let result = manager.process_with_engine(device.clone(), &engine).await;
    if let Some(progress) = progress {
        progress.finish().await;
    }

    let stats = match result {
        Ok(stats) => stats,
        Err(e) => {
            error!("Ingest of {} failed: {}", path.display(), e);
            return Err(e.into());
        }
    };

    if !quiet {
        display::print_run_summary(&device.name, &stats);
    }
    if stats.failed_files > 0 {
        bail!("{} of {} files failed", stats.failed_files, stats.total_files);
    }
    Ok(())
}

fn config_command(path: Option<&Path>, default: bool, write: Option<&Path>) -> Result<()> {
    if let Some(target) = write {
        ConfigLoader::generate_default_config(target)?;
        println!(
            "{} Wrote default configuration to {}",
            style("✓").green(),
            style(target.display()).cyan()
        );
        return Ok(());
    }

    let (title, config, render_as) = if default {
        ("Default configuration", Config::default(), PathBuf::from("config.yaml"))
    } else {
        let config = ConfigLoader::load(path)?;
        let render_as = path.map_or_else(|| PathBuf::from("config.yaml"), Path::to_path_buf);
        ("Effective configuration", config, render_as)
    };

    println!("{} {}:", style("⚙").blue().bold(), title);
    println!("{}", ConfigLoader::render(&config, &render_as)?);
    Ok(())
}
