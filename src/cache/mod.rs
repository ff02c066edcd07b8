//! Shell binary cache
//!
//! Maps a shell name to a directory on disk holding the compiled binary, its
//! runtime libraries and build metadata. An entry is in exactly one of three
//! states: complete (binary present), failed (`.busted` marker present), or
//! interrupted (directory exists with neither) — the last one is treated as
//! absent and purged before retrying.

pub mod lock;
pub mod purge;

pub use lock::{LockDir, LockError};

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::host::HostFacts;

/// Name of the cache directory under the base directory.
pub const CACHE_DIR_NAME: &str = "shell-cache";

/// Extension of the failure marker written next to a failed build.
pub const FAILURE_MARKER_EXT: &str = "busted";

/// Name of the build directory inside a cache entry.
pub const OBJDIR_NAME: &str = "objdir-js";

/// Retrieve the cache directory for compiled shells, creating it if needed.
pub fn ensure_cache_dir(base_dir: &Path) -> io::Result<PathBuf> {
    let cache_dir = base_dir.join(CACHE_DIR_NAME);
    fs::create_dir_all(&cache_dir)?;
    Ok(cache_dir)
}

/// Path of the lock directory guarding builds from the given source tree.
pub fn lock_dir_path(cache_base: &Path, repo_dir: &Path) -> io::Result<PathBuf> {
    let tree_name = repo_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("repo");
    Ok(ensure_cache_dir(cache_base)?.join(format!("shell-{tree_name}-lock")))
}

/// One cache entry, named by a shell name.
///
/// Only derives paths; the acquisition state machine decides when to create,
/// populate or purge the entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    name: String,
    dir: PathBuf,
    binary: PathBuf,
    marker: PathBuf,
}

impl CacheEntry {
    /// Derive the entry for `name` under `cache_base`, with the
    /// platform-appropriate binary filename.
    pub fn new(cache_base: &Path, name: &str, host: &HostFacts) -> io::Result<Self> {
        let dir = ensure_cache_dir(cache_base)?.join(name);
        let binary = dir.join(format!("{name}{}", host.os.exe_suffix()));
        let marker = dir.join(format!("{name}.{FAILURE_MARKER_EXT}"));
        Ok(Self {
            name: name.to_string(),
            dir,
            binary,
            marker,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the cached shell binary.
    pub fn binary_path(&self) -> &Path {
        &self.binary
    }

    /// Full path of the failure marker.
    pub fn failure_marker_path(&self) -> &Path {
        &self.marker
    }

    /// Build directory used while compiling into this entry.
    pub fn objdir(&self) -> PathBuf {
        self.dir.join(OBJDIR_NAME)
    }

    /// Path of the build metadata record.
    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(format!("{}.fuzzmanagerconf", self.name))
    }

    /// True iff a completed binary is present. Runtime libraries are assumed
    /// to be present alongside it; this is not separately verified.
    pub fn is_present(&self) -> bool {
        self.binary.is_file()
    }

    /// True iff a previous attempt at this entry failed.
    pub fn is_failed(&self) -> bool {
        self.marker.is_file()
    }

    /// True iff the entry directory exists at all.
    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Create the entry directory. Fails if it already exists; callers purge
    /// interrupted entries first.
    pub fn create(&self) -> io::Result<()> {
        fs::create_dir(&self.dir)
    }

    /// Remove the whole entry, tolerating read-only files left behind by the
    /// build toolchain.
    pub fn purge(&self) -> io::Result<()> {
        purge::rm_tree_incl_readonly(&self.dir)
    }

    /// Append diagnostic text to the failure marker, creating it if absent.
    pub fn append_failure_note(&self, note: &str) -> io::Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.marker)?;
        f.write_all(note.as_bytes())
    }
}
