//! Filesystem-based mutual exclusion for shell builds
//!
//! A lock is a directory whose existence denotes exclusive ownership of the
//! acquisition sequence for one source tree. Creation is atomic: if the
//! directory already exists, another process (or a stale human-driven run) is
//! assumed to be acting and the acquisition aborts instead of queueing. The
//! lock is advisory and non-reentrant.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from lock acquisition.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock directory already exists.
    #[error("another process holds the build lock at {0}")]
    Contention(PathBuf),

    #[error("I/O error creating lock at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A held tree lock. The directory is removed when this is dropped, on every
/// exit path.
#[derive(Debug)]
pub struct LockDir {
    path: PathBuf,
}

impl LockDir {
    /// Atomically create the lock directory.
    ///
    /// There is no blocking or retry: contention is a fatal error by design.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        match fs::create_dir(path) {
            Ok(()) => Ok(Self {
                path: path.to_path_buf(),
            }),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(LockError::Contention(path.to_path_buf()))
            }
            Err(source) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockDir {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir(&self.path) {
            eprintln!(
                "[cache] WARNING: could not remove lock {}: {err}",
                self.path.display()
            );
        }
    }
}
