//! Recursive removal tolerant of read-only files
//!
//! Some build toolchains mark artifacts read-only, which makes a plain
//! `remove_dir_all` fail on Windows. Removal here clears the read-only
//! attribute and retries once; any other I/O error propagates.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Remove a directory tree, clearing read-only attributes where needed.
///
/// Removing a tree that does not exist is a no-op.
pub fn rm_tree_incl_readonly(root: &Path) -> io::Result<()> {
    if !root.exists() {
        return Ok(());
    }

    for entry in WalkDir::new(root).contents_first(true) {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir(path)?;
        } else if let Err(err) = fs::remove_file(path) {
            if err.kind() == io::ErrorKind::PermissionDenied {
                let mut perms = fs::metadata(path)?.permissions();
                #[allow(clippy::permissions_set_readonly_false)]
                perms.set_readonly(false);
                fs::set_permissions(path, perms)?;
                fs::remove_file(path)?;
            } else {
                return Err(err);
            }
        }
    }
    Ok(())
}
