//! Core type system and error handling for mediaingest
//!
//! This crate provides the shared data model used by every mediaingest crate:
//!
//! - **Error handling**: one error enum with a crate-wide `Result` alias
//! - **Core types**: devices, classification results, transfer jobs and run statistics
//! - **Traits**: the device detector capability and the notifier sink
//! - **Configuration**: validated scalars (worker counts, retry policy, digest choice)
//!
//! # Features
//!
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use ingest_types::{Device, TransferStats};
//!
//! let device = Device::new("sdb1", "/dev/sdb1")
//!     .with_filesystem("exfat")
//!     .with_size(64 * 1024 * 1024 * 1024);
//! assert!(!device.is_mounted());
//!
//! let stats = TransferStats::new();
//! assert_eq!(stats.progress(), 0.0);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{
    ChecksumAlgorithm, DetectorSettings, DevicePolicy, EngineSettings, RetryConfig, WorkerCount,
};
pub use error::Error;
pub use result::Result;
pub use traits::*;
pub use types::*;
