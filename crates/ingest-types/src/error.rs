//! Error types and handling for mediaingest
//!
//! Only device-level failures (mount, scan, pre-dispatch) ever reach a caller as
//! an `Error`. Per-file failures use the same type internally but are absorbed
//! into run statistics by the transfer engine.

use std::io;
use std::path::{Path, PathBuf};

/// Main error type for mediaingest operations
#[derive(thiserror::Error, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// File not found
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found
        path: PathBuf,
    },

    /// Permission denied
    #[error("Permission denied: {path}")]
    PermissionDenied {
        /// Path to the file with permission issues
        path: PathBuf,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Device detection error
    #[error("Device detection error: {message}")]
    DeviceDetection {
        /// Error message describing the device detection issue
        message: String,
    },

    /// Mounting a device failed
    #[error("Failed to mount device {device}: {message}")]
    Mount {
        /// Identifier of the device
        device: String,
        /// Error message from the detector
        message: String,
    },

    /// Enumerating files on a device failed
    #[error("Failed to scan {path}: {message}")]
    Scan {
        /// Root that was being scanned
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// The classification pattern is unusable
    #[error("Invalid classification pattern: {message}")]
    Pattern {
        /// Error message describing the pattern issue
        message: String,
    },

    /// Every versioned candidate for a destination is taken
    #[error("Too many versions of file: {path}")]
    TooManyVersions {
        /// The unversioned destination path
        path: PathBuf,
    },

    /// Source and destination digests differ after a verified copy
    #[error("Checksum mismatch for {path}")]
    ChecksumMismatch {
        /// Source path of the file
        path: PathBuf,
    },

    /// The destination root cannot be used for this run
    #[error("Destination unavailable: {path}: {message}")]
    DestinationUnavailable {
        /// Destination root
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

impl Error {
    /// Build an error from an I/O failure on a specific path
    pub fn io_at(path: &Path, error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::FileNotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Self::Io {
                message: format!("{}: {}", path.display(), error),
            },
        }
    }

    /// Whether a per-file failure of this kind may succeed on another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io { .. } | Self::ChecksumMismatch { .. } => true,
            Self::FileNotFound { .. }
            | Self::PermissionDenied { .. }
            | Self::Config { .. }
            | Self::DeviceDetection { .. }
            | Self::Mount { .. }
            | Self::Scan { .. }
            | Self::Pattern { .. }
            | Self::TooManyVersions { .. }
            | Self::DestinationUnavailable { .. }
            | Self::Other { .. } => false,
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new device detection error
    pub fn device_detection<S: Into<String>>(message: S) -> Self {
        Self::DeviceDetection {
            message: message.into(),
        }
    }

    /// Create a new mount error
    pub fn mount<D: Into<String>, S: Into<String>>(device: D, message: S) -> Self {
        Self::Mount {
            device: device.into(),
            message: message.into(),
        }
    }

    /// Create a new pattern error
    pub fn pattern<S: Into<String>>(message: S) -> Self {
        Self::Pattern {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_io_errors_are_retryable(message in ".*") {
            let error = Error::Io { message };
            prop_assert!(error.is_retryable());
        }

        #[test]
        fn test_structural_errors_are_not_retryable(message in ".*") {
            let errors = vec![
                Error::Config { message: message.clone() },
                Error::DeviceDetection { message: message.clone() },
                Error::Pattern { message: message.clone() },
                Error::Other { message: message.clone() },
                Error::mount("sdb1", message.clone()),
            ];

            for error in errors {
                prop_assert!(!error.is_retryable());
            }
        }
    }

    #[test]
    fn test_io_at_classifies_kinds() {
        let path = Path::new("/media/card/clip.mp4");

        let not_found = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            Error::io_at(path, &not_found),
            Error::FileNotFound { .. }
        ));

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "no");
        assert!(matches!(
            Error::io_at(path, &denied),
            Error::PermissionDenied { .. }
        ));

        let other = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let error = Error::io_at(path, &other);
        assert!(error.is_retryable());
        assert!(error.to_string().contains("clip.mp4"));
    }

    #[test]
    fn test_display_messages() {
        let error = Error::TooManyVersions {
            path: PathBuf::from("/mnt/storage/Nike/001.mp4"),
        };
        assert_eq!(
            error.to_string(),
            "Too many versions of file: /mnt/storage/Nike/001.mp4"
        );

        let error = Error::mount("sdb1", "auto-mount is disabled");
        assert_eq!(
            error.to_string(),
            "Failed to mount device sdb1: auto-mount is disabled"
        );
    }
}
