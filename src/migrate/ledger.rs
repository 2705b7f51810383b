//! Checksum ledger.
//!
//! In deferred mode every copied file appends one record
//!
//! ```text
//! 3f786850e387550fdab836ed7e6dc881de23001b  /mnt/dst/a.txt
//! ```
//!
//! (hex digest, two spaces, destination path), the format `sha1sum -c`
//! understands. Records are appended whole under a lock, so concurrent jobs
//! never interleave.

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One `digest  path` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    /// Lowercase hex digest
    pub digest: String,
    /// Destination path
    pub path: PathBuf,
}

impl ChecksumRecord {
    /// Create a record.
    pub fn new(digest: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            digest: digest.into(),
            path: path.into(),
        }
    }

    /// Serialized line, newline included.
    pub fn to_line(&self) -> Vec<u8> {
        let path = path_bytes(&self.path);
        let mut line = Vec::with_capacity(self.digest.len() + 3 + path.len());
        line.extend_from_slice(self.digest.as_bytes());
        line.extend_from_slice(b"  ");
        line.extend_from_slice(&path);
        line.push(b'\n');
        line
    }

    /// Parse one line (without its newline).
    ///
    /// The digest is everything up to the first space and must be hex; the
    /// separator is two spaces (or the ` *` binary marker) and the path is
    /// the rest of the line, spaces included.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let split = line.iter().position(|&b| b == b' ')?;
        let (digest, rest) = line.split_at(split);
        if digest.is_empty() || !digest.iter().all(u8::is_ascii_hexdigit) {
            return None;
        }
        let path = rest
            .strip_prefix(b"  ")
            .or_else(|| rest.strip_prefix(b" *"))?;
        if path.is_empty() {
            return None;
        }

        Some(Self {
            digest: String::from_utf8_lossy(digest).to_ascii_lowercase(),
            path: path_from_bytes(path),
        })
    }
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(OsString::from_vec(bytes.to_vec()))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(OsString::from(String::from_utf8_lossy(bytes).into_owned()))
}

/// Append-only ledger file shared by all jobs of a run.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    file: Mutex<File>,
}

impl Ledger {
    /// Create (or truncate) the ledger at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ledger`] if the file cannot be opened for writing.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| Error::Ledger {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// Ledger location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single write.
    pub fn append(&self, record: &ChecksumRecord) -> io::Result<()> {
        let line = record.to_line();
        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(&line)
    }

    /// Flush the ledger to durable storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ledger`] if the sync fails.
    pub fn finish(&self) -> Result<()> {
        let file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.sync_all().map_err(|source| Error::Ledger {
            path: self.path.clone(),
            source,
        })
    }
}

/// Read every line of a ledger.
///
/// Blank lines are skipped; lines that do not parse come back as
/// [`Error::MalformedRecord`] so the caller can count them without stopping.
///
/// # Errors
///
/// Returns [`Error::Ledger`] if the file cannot be opened or read.
pub fn read_records(path: &Path) -> Result<Vec<Result<ChecksumRecord>>> {
    let ledger_err = |source| Error::Ledger {
        path: path.to_path_buf(),
        source,
    };
    let reader = BufReader::new(File::open(path).map_err(ledger_err)?);

    let mut records = Vec::new();
    for (index, line) in reader.split(b'\n').enumerate() {
        let line = line.map_err(ledger_err)?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        records.push(ChecksumRecord::parse(&line).ok_or_else(|| Error::MalformedRecord {
            line: index + 1,
            content: String::from_utf8_lossy(&line).into_owned(),
        }));
    }
    Ok(records)
}
