//! Ingest pipeline for mediaingest
//!
//! This crate turns a mounted removable device into organised, verified
//! copies under a destination root.
//!
//! # Features
//!
//! - **Classification**: one 4-group pattern maps file names to
//!   project/client/camera/clip and to a destination folder
//! - **Collision-free destinations**: exclusive-create claims with `_v2`,
//!   `_v3`, ... versioning
//! - **Priority tiers**: files with configured name prefixes are dispatched first
//! - **Worker pool**: a bounded queue feeding a fixed number of workers
//! - **Verification**: SHA-256 or BLAKE3 digests of source and written copy
//! - **Device lifecycle**: inclusion policy, mounting, scanning, reporting
//!
//! # Examples
//!
//! ```rust,no_run
//! use ingest_engine::TransferEngine;
//! use ingest_types::EngineSettings;
//! use std::path::PathBuf;
//!
//! # async fn example() -> ingest_types::Result<()> {
//! let engine = TransferEngine::from_settings(EngineSettings::new("/mnt/storage"))?;
//! let files = vec![PathBuf::from("/media/card/BrandVideo_Nike_ACam_001.mp4")];
//! let stats = engine.transfer_files("card", &files).await?;
//! println!("{} of {} files transferred", stats.succeeded_files(), stats.total_files);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod checksum;
pub mod classifier;
pub mod engine;
pub mod executor;
pub mod lifecycle;
pub mod monitor;
pub mod notify;
pub mod resolver;
pub mod scheduler;
pub mod watcher;

pub use classifier::Classifier;
pub use engine::TransferEngine;
pub use executor::CopyOptions;
pub use lifecycle::{check_policy, scan_files, DeviceManager, Rejection};
pub use monitor::StatsHandle;
pub use notify::{format_size, format_summary, LogNotifier};
pub use resolver::{claim_destination, MAX_VERSIONS};
pub use watcher::DeviceWatcher;
