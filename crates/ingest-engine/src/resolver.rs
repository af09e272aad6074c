//! Collision-free destination claims
//!
//! A destination is claimed by exclusively creating it. The first candidate
//! is the unversioned path; the rest insert `_v2`, `_v3`, ... before the
//! extension. Claims are atomic with respect to other claimants in this
//! process and to files that already exist.

use ingest_types::{Error, Result};
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Total candidate names tried per destination, the unversioned one included
pub const MAX_VERSIONS: u32 = 1000;

/// `path` with `_v{version}` inserted before its extension
pub fn versioned_path(path: &Path, version: u32) -> PathBuf {
    let mut name = path.file_stem().map(OsString::from).unwrap_or_default();
    name.push(format!("_v{}", version));
    if let Some(extension) = path.extension() {
        name.push(".");
        name.push(extension);
    }
    path.with_file_name(name)
}

/// Candidate names in probe order
fn candidates(path: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    std::iter::once(path.to_path_buf())
        .chain((2..=MAX_VERSIONS).map(move |version| versioned_path(path, version)))
}

/// Claim the first free candidate for `path`, leaving an empty file there
///
/// Parent directories are created as needed. Fails with
/// [`Error::TooManyVersions`] when every candidate is taken.
pub async fn claim_destination(path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_at(parent, &e))?;
    }

    for candidate in candidates(path) {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => {
                if candidate != path {
                    debug!(
                        "Destination {} taken, using {}",
                        path.display(),
                        candidate.display()
                    );
                }
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(Error::io_at(&candidate, &e)),
        }
    }

    Err(Error::TooManyVersions {
        path: path.to_path_buf(),
    })
}

/// Remove a claimed destination, ignoring one that is already gone
pub async fn release_destination(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            debug!("Could not remove {}: {}", path.display(), e);
        }
    }
}
