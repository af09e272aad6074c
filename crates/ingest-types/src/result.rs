//! Result type alias for mediaingest operations

use crate::Error;

/// Result type alias for mediaingest operations
pub type Result<T> = std::result::Result<T, Error>;
