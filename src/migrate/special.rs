//! Symlinks and device nodes.
//!
//! Both are recreated synchronously by the walker. Neither has content to
//! digest, so neither produces a ledger record or a verification line.

use super::SourceEntry;
use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

// =============================================================================
// Symlinks
// =============================================================================

#[cfg(unix)]
use std::os::unix::fs::symlink;

#[cfg(not(unix))]
fn symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Symlinks not supported on this platform",
    ))
}

/// Recreate the link at `src` as `dst`, pointing at the same target text.
///
/// An existing symlink at `dst` is replaced. Returns the target.
pub(crate) fn recreate_symlink(src: &Path, dst: &Path) -> Result<PathBuf> {
    let target = fs::read_link(src).map_err(|source| Error::Symlink {
        path: src.to_path_buf(),
        source,
    })?;

    if fs::symlink_metadata(dst).is_ok_and(|m| m.file_type().is_symlink()) {
        fs::remove_file(dst).map_err(|source| Error::Symlink {
            path: dst.to_path_buf(),
            source,
        })?;
    }

    symlink(&target, dst).map_err(|source| Error::Symlink {
        path: dst.to_path_buf(),
        source,
    })?;
    Ok(target)
}

/// Copy owner and timestamps onto the link itself (not its target).
pub(crate) fn replicate_link_metadata(entry: &SourceEntry, dst: &Path) -> Vec<String> {
    let mut warnings = Vec::new();

    #[cfg(unix)]
    {
        if let Err(e) = std::os::unix::fs::lchown(dst, Some(entry.uid), Some(entry.gid)) {
            warnings.push(format!(
                "lchown {}:{} {} failed: {e}",
                entry.uid,
                entry.gid,
                dst.display()
            ));
        }
    }
    if let Err(e) = filetime::set_symlink_file_times(dst, entry.atime, entry.mtime) {
        warnings.push(format!("set link times on {} failed: {e}", dst.display()));
    }

    warnings
}

// =============================================================================
// Device nodes
// =============================================================================

/// Block or character device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Block device
    Block,
    /// Character device
    Char,
}

/// Major/minor device numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    /// Major number (driver)
    pub major: u32,
    /// Minor number (instance)
    pub minor: u32,
}

impl DeviceId {
    /// Decode a raw `st_rdev` value (Linux encoding).
    ///
    /// For small numbers this is the classic high byte / low byte split.
    pub const fn from_raw(rdev: u64) -> Self {
        let major = ((rdev >> 8) & 0x0fff) | ((rdev >> 32) & 0xffff_f000);
        let minor = (rdev & 0xff) | ((rdev >> 12) & 0xffff_ff00);
        Self {
            major: major as u32,
            minor: minor as u32,
        }
    }

    /// Encode back into a raw device value.
    pub const fn to_raw(self) -> u64 {
        let major = self.major as u64;
        let minor = self.minor as u64;
        ((major & 0x0fff) << 8)
            | ((major & 0xffff_f000) << 32)
            | (minor & 0xff)
            | ((minor & 0xffff_ff00) << 12)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Creates device nodes.
///
/// Abstracted so that device handling can be exercised without privileges.
pub trait NodeMaker: Send + Sync {
    /// Create a node of `kind` at `path` with permission bits `mode`.
    fn make_node(&self, path: &Path, kind: NodeKind, mode: u32, device: DeviceId) -> io::Result<()>;
}

/// [`NodeMaker`] calling `mknod(2)`; usually requires root.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNodeMaker;

impl NodeMaker for SystemNodeMaker {
    #[cfg(unix)]
    fn make_node(&self, path: &Path, kind: NodeKind, mode: u32, device: DeviceId) -> io::Result<()> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let type_bits = match kind {
            NodeKind::Block => libc::S_IFBLK,
            NodeKind::Char => libc::S_IFCHR,
        };

        // SAFETY: c_path is a valid NUL-terminated string for the call's duration.
        let result = unsafe {
            libc::mknod(
                c_path.as_ptr(),
                type_bits | (mode & 0o7777) as libc::mode_t,
                device.to_raw() as libc::dev_t,
            )
        };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn make_node(&self, _path: &Path, _kind: NodeKind, _mode: u32, _device: DeviceId) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "Device nodes not supported on this platform",
        ))
    }
}

/// Recreate the device node described by `entry` at `dst`.
///
/// Returns the decoded device id.
pub(crate) fn create_device(maker: &dyn NodeMaker, entry: &SourceEntry, dst: &Path) -> Result<DeviceId> {
    let kind = match entry.kind {
        super::EntryKind::BlockDevice => NodeKind::Block,
        super::EntryKind::CharDevice => NodeKind::Char,
        _ => {
            return Err(Error::DeviceNode {
                path: dst.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a device node"),
            });
        }
    };
    let device = DeviceId::from_raw(entry.rdev);

    maker
        .make_node(dst, kind, entry.permissions(), device)
        .map_err(|source| Error::DeviceNode {
            path: dst.to_path_buf(),
            source,
        })?;
    Ok(device)
}
