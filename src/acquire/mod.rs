//! Shell acquisition state machine
//!
//! `obtain_shell` is the single entry point for getting a shell binary: it
//! consults the cache, and on a miss drives checkout, configure, compile,
//! verification and metadata recording, leaving the cache entry in a state
//! the next run can trust. The invariant maintained on every exit path is
//! that an entry directory either holds a verified binary, holds a `.busted`
//! failure marker, or does not exist.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::builder::{is_compiler_oom, BuildContext, BuildStrategy, BuildToolError};
use crate::cache::{lock_dir_path, CacheEntry, LockDir};
use crate::host::HostFacts;
use crate::identity::{compute_shell_name, IdentityError};
use crate::metadata::write_fuzzmanagerconf;
use crate::options::BuildOptions;
use crate::signal::{CancelToken, Cancelled};
use crate::vcs::{VcsError, VersionControl};
use crate::verify::{verify_binary, Inspector, VerifyError};

#[derive(Debug, Error)]
pub enum AcquireError {
    /// A previous attempt at this exact configuration and revision failed.
    #[error("this configuration failed to build before; remove {marker} to retry")]
    CachedFailure { marker: PathBuf },

    #[error("acquisition interrupted")]
    Interrupted,

    #[error("could not update tree to {revision}: {source}")]
    Checkout {
        revision: String,
        #[source]
        source: VcsError,
    },

    #[error("configure failed: {0}")]
    Configure(#[source] BuildToolError),

    #[error("compile failed: {0}")]
    Compile(#[source] BuildToolError),

    /// The compile step finished but produced no binary.
    #[error("compilation did not produce a binary:\n{output}")]
    NoBinary { output: String },

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<Cancelled> for AcquireError {
    fn from(_: Cancelled) -> Self {
        AcquireError::Interrupted
    }
}

/// One requested shell: the options, host, source tree and revision it is
/// built from, and the cache entry it lives in.
#[derive(Debug)]
pub struct Shell {
    pub opts: BuildOptions,
    pub host: HostFacts,
    pub revision: String,
    pub repo_dir: PathBuf,
    pub jobs: usize,
    entry: CacheEntry,
}

impl Shell {
    pub fn new(
        opts: BuildOptions,
        host: HostFacts,
        cache_base: &Path,
        repo_dir: PathBuf,
        revision: &str,
        jobs: usize,
    ) -> Result<Self, AcquireError> {
        let name = compute_shell_name(&opts, &host, revision)?;
        let entry = CacheEntry::new(cache_base, &name, &host)?;
        Ok(Self {
            opts,
            host,
            revision: revision.to_string(),
            repo_dir,
            jobs,
            entry,
        })
    }

    pub fn name(&self) -> &str {
        self.entry.name()
    }

    pub fn entry(&self) -> &CacheEntry {
        &self.entry
    }

    /// Path of the lock directory guarding this shell's source tree.
    pub fn lock_path(&self, cache_base: &Path) -> io::Result<PathBuf> {
        lock_dir_path(cache_base, &self.repo_dir)
    }
}

/// Get a verified shell binary for the requested configuration, building it
/// if the cache has no usable entry.
///
/// The caller holds the tree lock for the whole call; taking it as a
/// parameter keeps unlocked acquisition out of the API.
pub fn obtain_shell(
    shell: &Shell,
    strategy: &dyn BuildStrategy,
    vcs: Option<&dyn VersionControl>,
    inspector: &dyn Inspector,
    cancel: &CancelToken,
    _tree_lock: &LockDir,
    update_to_rev: Option<&str>,
) -> Result<PathBuf, AcquireError> {
    cancel.checkpoint()?;
    let entry = &shell.entry;

    if entry.is_present() {
        eprintln!(
            "[cache] found cached shell {}",
            entry.binary_path().display()
        );
        return Ok(entry.binary_path().to_path_buf());
    }

    if entry.is_failed() {
        return Err(AcquireError::CachedFailure {
            marker: entry.failure_marker_path().to_path_buf(),
        });
    }

    if entry.exists() {
        // Directory with neither binary nor marker: an earlier run was
        // interrupted partway. Start over.
        eprintln!(
            "[cache] removing incomplete entry {}",
            entry.dir().display()
        );
        entry.purge()?;
    }

    entry.create()?;

    match build_into_entry(shell, strategy, vcs, inspector, cancel, update_to_rev) {
        Ok(binary) => Ok(binary),
        Err(AcquireError::Interrupted) => {
            entry.purge()?;
            Err(AcquireError::Interrupted)
        }
        Err(err) => {
            record_failure(entry, &err)?;
            Err(err)
        }
    }
}

fn build_into_entry(
    shell: &Shell,
    strategy: &dyn BuildStrategy,
    vcs: Option<&dyn VersionControl>,
    inspector: &dyn Inspector,
    cancel: &CancelToken,
    update_to_rev: Option<&str>,
) -> Result<PathBuf, AcquireError> {
    let entry = &shell.entry;

    cancel.checkpoint()?;
    if let (Some(vcs), Some(rev)) = (vcs, update_to_rev) {
        vcs.checkout(&shell.repo_dir, rev)
            .map_err(|source| AcquireError::Checkout {
                revision: rev.to_string(),
                source,
            })?;
    }

    let objdir = entry.objdir();
    fs::create_dir(&objdir)?;
    let ctx = BuildContext {
        opts: &shell.opts,
        host: &shell.host,
        repo_dir: &shell.repo_dir,
        objdir: &objdir,
        jobs: shell.jobs,
    };

    cancel.checkpoint()?;
    let record = strategy.configure(&ctx).map_err(AcquireError::Configure)?;

    cancel.checkpoint()?;
    let mut out = strategy
        .compile(&ctx, &record)
        .map_err(AcquireError::Compile)?;

    let compiled = strategy.compiled_binary_path(&ctx);
    if !compiled.is_file() && is_compiler_oom(&shell.host, &out.text) {
        eprintln!("[build] compiler ran out of memory, retrying the compile once");
        cancel.checkpoint()?;
        out = strategy
            .compile(&ctx, &record)
            .map_err(AcquireError::Compile)?;
    }

    if !compiled.is_file() {
        return Err(AcquireError::NoBinary { output: out.text });
    }
    if !out.success() {
        // Some make versions exit non-zero even when the shell was built.
        eprintln!(
            "[build] WARNING: make exited with {:?} but the binary exists, continuing",
            out.status
        );
    }

    cancel.checkpoint()?;
    fs::copy(&compiled, entry.binary_path())?;
    for lib in strategy.runtime_libs(&ctx) {
        if lib.is_file() {
            if let Some(name) = lib.file_name() {
                fs::copy(&lib, entry.dir().join(name))?;
            }
        }
    }

    let version = strategy.product_version(&ctx).unwrap_or_default();

    cancel.checkpoint()?;
    verify_binary(inspector, entry.binary_path(), &shell.opts, &shell.host)?;

    if !entry.metadata_path().is_file() {
        write_fuzzmanagerconf(
            &entry.metadata_path(),
            &shell.opts,
            &shell.host,
            &shell.repo_dir,
            &shell.revision,
            &version,
            &record,
        )?;
    }

    Ok(entry.binary_path().to_path_buf())
}

/// Persist a build failure: drop the build directory and any partially
/// copied binary, then append the diagnostics to the failure marker so later
/// runs skip this configuration.
fn record_failure(entry: &CacheEntry, err: &AcquireError) -> Result<(), io::Error> {
    crate::cache::purge::rm_tree_incl_readonly(&entry.objdir())?;
    if entry.binary_path().is_file() {
        fs::remove_file(entry.binary_path())?;
    }
    entry.append_failure_note(&format!("{err}\n"))?;
    eprintln!(
        "[cache] build failed, marker written to {}",
        entry.failure_marker_path().display()
    );
    Ok(())
}
