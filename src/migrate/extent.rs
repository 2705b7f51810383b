//! Data/hole boundary discovery for sparse copies.

use std::fs::File;
use std::io;

/// Next data and hole boundaries at or after a file offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundaries {
    /// First offset `>= offset` holding data (`size` if none remains)
    pub data: u64,
    /// First offset `>= offset` inside a hole (`size` if none remains)
    pub hole: u64,
}

impl Boundaries {
    /// The remainder of the file treated as one data region.
    pub const fn all_data(offset: u64, size: u64) -> Self {
        Self {
            data: offset,
            hole: size,
        }
    }
}

/// Queries a file's extent map.
///
/// Returning `Ok(None)` means the filesystem cannot answer; the copy engine
/// then treats the rest of the file as data.
pub trait ExtentScanner: Send + Sync {
    /// Boundaries at or after `offset` in a file of logical length `size`.
    ///
    /// May move the file position.
    fn boundaries(&self, file: &File, offset: u64, size: u64) -> io::Result<Option<Boundaries>>;
}

/// Scanner backed by `lseek(2)` with `SEEK_DATA` / `SEEK_HOLE`.
///
/// Only Linux is queried; elsewhere every file reads as fully allocated.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeekScanner;

impl ExtentScanner for SeekScanner {
    #[cfg(target_os = "linux")]
    fn boundaries(&self, file: &File, offset: u64, size: u64) -> io::Result<Option<Boundaries>> {
        let Some(data) = seek(file, offset, libc::SEEK_DATA, size)? else {
            return Ok(None);
        };
        let Some(hole) = seek(file, offset, libc::SEEK_HOLE, size)? else {
            return Ok(None);
        };
        Ok(Some(Boundaries {
            data: data.min(size),
            hole: hole.min(size),
        }))
    }

    #[cfg(not(target_os = "linux"))]
    fn boundaries(&self, _file: &File, _offset: u64, _size: u64) -> io::Result<Option<Boundaries>> {
        Ok(None)
    }
}

/// `lseek` one boundary; `ENXIO` (nothing past `offset`) reads as `size`.
#[cfg(target_os = "linux")]
fn seek(file: &File, offset: u64, whence: libc::c_int, size: u64) -> io::Result<Option<u64>> {
    use std::os::unix::io::AsRawFd;

    let Ok(start) = libc::off_t::try_from(offset) else {
        return Ok(Some(size));
    };

    // SAFETY: valid descriptor borrowed from `file`; lseek touches no memory.
    let result = unsafe { libc::lseek(file.as_raw_fd(), start, whence) };
    if result >= 0 {
        return Ok(Some(result as u64));
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ENXIO) => Ok(Some(size)),
        Some(libc::EINVAL) | Some(libc::EOPNOTSUPP) | Some(libc::ENOSYS) => Ok(None),
        _ => Err(err),
    }
}

/// Whether the allocation heuristic allows skipping extent queries.
///
/// A file whose allocated blocks cover its logical size has no holes worth
/// finding.
pub(crate) fn looks_dense(size: u64, blocks: u64) -> bool {
    blocks.saturating_mul(512) >= size
}
