//! Streaming copy engine.
//!
//! Copies a source into a destination in [`CHUNK_SIZE`] chunks while feeding
//! every byte to the digest. In sparse mode, holes reported by an
//! [`ExtentScanner`] are skipped on the destination (never written) but still
//! hashed as zeros, so the resulting digest always describes the logical
//! content of the file and equals a plain read-back of the destination.

use super::extent::{Boundaries, ExtentScanner, looks_dense};
use crate::digest::{CHUNK_SIZE, Hasher};
use crate::error::Stage;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

static ZEROS: [u8; CHUNK_SIZE] = [0; CHUNK_SIZE];

/// An io error tagged with the stage it happened in.
pub(crate) type StageResult<T> = std::result::Result<T, (Stage, io::Error)>;

/// Result of a completed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Copied {
    /// Hex digest of the logical content
    pub digest: String,
    /// Bytes physically written to the destination
    pub bytes_written: u64,
}

/// Stream `src` into `dst`.
///
/// `size` and `blocks` come from the source snapshot. Passing a
/// scanner enables sparse mode; it is only consulted when the allocation
/// heuristic says the file may have holes.
pub(crate) fn copy_stream(
    src: &File,
    dst: &File,
    size: u64,
    blocks: u64,
    scanner: Option<&dyn ExtentScanner>,
    mut hasher: Box<dyn Hasher>,
) -> StageResult<Copied> {
    let mut buffer = vec![0u8; CHUNK_SIZE];

    let bytes_written = match scanner {
        Some(scanner) if !looks_dense(size, blocks) => {
            let written = copy_sparse(src, dst, size, scanner, hasher.as_mut(), &mut buffer)?;
            if written == 0 && size > 0 {
                // Nothing but holes: the destination still needs its length.
                dst.set_len(size).map_err(|e| (Stage::Write, e))?;
            }
            written
        }
        _ => copy_dense(src, dst, hasher.as_mut(), &mut buffer)?,
    };

    Ok(Copied {
        digest: hasher.finalize_hex(),
        bytes_written,
    })
}

fn read_chunk(mut src: &File, buffer: &mut [u8]) -> StageResult<usize> {
    loop {
        match src.read(buffer) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err((Stage::Read, e)),
        }
    }
}

fn copy_dense(
    src: &File,
    mut dst: &File,
    hasher: &mut dyn Hasher,
    buffer: &mut [u8],
) -> StageResult<u64> {
    let mut written = 0u64;
    loop {
        let n = read_chunk(src, buffer)?;
        if n == 0 {
            return Ok(written);
        }
        hasher.update(&buffer[..n]);
        dst.write_all(&buffer[..n]).map_err(|e| (Stage::Write, e))?;
        written += n as u64;
    }
}

fn feed_zeros(hasher: &mut dyn Hasher, mut len: u64) {
    while len > 0 {
        let n = len.min(CHUNK_SIZE as u64) as usize;
        hasher.update(&ZEROS[..n]);
        len -= n as u64;
    }
}

fn copy_sparse(
    mut src: &File,
    mut dst: &File,
    size: u64,
    scanner: &dyn ExtentScanner,
    hasher: &mut dyn Hasher,
    buffer: &mut [u8],
) -> StageResult<u64> {
    let mut offset = 0u64;
    let mut written = 0u64;

    while offset < size {
        let bounds = scanner
            .boundaries(src, offset, size)
            .map_err(|e| (Stage::Read, e))?
            .unwrap_or(Boundaries::all_data(offset, size));

        if bounds.data > offset {
            // Hole up to the next data (or the end of file).
            let next = bounds.data.min(size);
            feed_zeros(hasher, next - offset);
            offset = next;
            dst.set_len(offset).map_err(|e| (Stage::Write, e))?;
            continue;
        }

        let end = if bounds.hole > offset {
            bounds.hole.min(size)
        } else {
            size
        };
        src.seek(SeekFrom::Start(offset))
            .map_err(|e| (Stage::Read, e))?;
        dst.seek(SeekFrom::Start(offset))
            .map_err(|e| (Stage::Write, e))?;

        while offset < end {
            let want = (end - offset).min(buffer.len() as u64) as usize;
            let n = read_chunk(src, &mut buffer[..want])?;
            if n == 0 {
                // Source shrank underneath us.
                return Ok(written);
            }
            hasher.update(&buffer[..n]);
            dst.write_all(&buffer[..n])
                .map_err(|e| (Stage::Write, e))?;
            offset += n as u64;
            written += n as u64;
        }
    }

    Ok(written)
}
