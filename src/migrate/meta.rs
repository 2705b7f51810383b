//! Metadata replication for destination entries.
//!
//! Every step here is best-effort: failures are returned as warning messages
//! for the caller to log, never as errors, because a file whose content is
//! verified is still a successful migration.

use super::SourceEntry;
use crate::error::{Error, Result};
use filetime::set_file_times;
use std::fs;
use std::io;
use std::path::Path;

// =============================================================================
// Attribute setters
// =============================================================================

/// Set owner and group (following symlinks).
#[cfg(unix)]
pub(crate) fn set_owner(path: &Path, uid: u32, gid: u32) -> io::Result<()> {
    std::os::unix::fs::chown(path, Some(uid), Some(gid))
}

#[cfg(not(unix))]
pub(crate) fn set_owner(_path: &Path, _uid: u32, _gid: u32) -> io::Result<()> {
    Ok(())
}

/// Set the standard permission bits.
#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, perms)
}

/// Copy access and modification times.
pub(crate) fn preserve_timestamps(entry: &SourceEntry, dst: &Path) -> io::Result<()> {
    set_file_times(dst, entry.atime, entry.mtime)
}

// =============================================================================
// Regular files
// =============================================================================

/// Re-stat `src` and replicate its attributes onto `dst`.
///
/// Returns one message per step that failed.
pub(crate) fn replicate(src: &Path, dst: &Path) -> Vec<String> {
    match SourceEntry::stat(src) {
        Ok(entry) => apply(&entry, dst),
        Err(e) => vec![format!("cannot stat {} for metadata: {e}", src.display())],
    }
}

/// Apply owner, permissions and timestamps of `entry` to `dst`.
///
/// The owner goes first: changing it may clear permission bits on some
/// systems.
pub(crate) fn apply(entry: &SourceEntry, dst: &Path) -> Vec<String> {
    let mut warnings = Vec::new();

    if let Err(e) = set_owner(dst, entry.uid, entry.gid) {
        warnings.push(format!(
            "chown {}:{} {} failed: {e}",
            entry.uid,
            entry.gid,
            dst.display()
        ));
    }
    if let Err(e) = set_mode(dst, entry.mode) {
        warnings.push(format!(
            "chmod {:o} {} failed: {e}",
            entry.permissions(),
            dst.display()
        ));
    }
    if let Err(e) = preserve_timestamps(entry, dst) {
        warnings.push(format!("set times on {} failed: {e}", dst.display()));
    }

    warnings
}

// =============================================================================
// Directories
// =============================================================================

/// Create the mirrored directory unless it already exists.
///
/// Returns `true` if it was created. The new directory gets the source
/// permission bits, filtered by the process umask like `mkdir(2)`.
pub(crate) fn ensure_dir(entry: &SourceEntry, dst: &Path) -> Result<bool> {
    match fs::symlink_metadata(dst) {
        Ok(meta) if meta.is_dir() => return Ok(false),
        Ok(_) => {
            return Err(Error::CreateDir {
                path: dst.to_path_buf(),
                source: io::Error::new(io::ErrorKind::AlreadyExists, "exists and is not a directory"),
            });
        }
        Err(_) => {}
    }

    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(entry.permissions());
    }
    #[cfg(not(unix))]
    let _ = entry;

    builder.create(dst).map_err(|source| Error::CreateDir {
        path: dst.to_path_buf(),
        source,
    })?;
    Ok(true)
}

// =============================================================================
// Tests
// =============================================================================
