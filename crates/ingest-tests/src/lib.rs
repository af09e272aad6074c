//! mediaingest integration test support
//!
//! Integration tests live in `tests/`; this crate only carries the fixtures
//! they share.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Shared test fixtures
///
/// A scripted device detector, a recording notifier and on-disk card and
/// storage helpers.
pub mod test_utils;
