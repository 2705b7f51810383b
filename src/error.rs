//! Error types for parmig.
//!
//! This module provides the [`Error`] enum containing all possible errors
//! that can occur during a migration, the [`Stage`] tag attached to every
//! per-file failure, and the [`Result`] type alias.
//!
//! # Error Categories
//!
//! | Category | Errors |
//! |----------|--------|
//! | Per-file job | [`Error::Job`], [`Error::Mismatch`] |
//! | Synchronous tree | [`Error::CreateDir`], [`Error::Symlink`], [`Error::DeviceNode`] |
//! | Setup | [`Error::SourceNotFound`], [`Error::Spawn`], [`Error::Ledger`] |
//! | Ledger replay | [`Error::MalformedRecord`], [`Error::ForeignDigest`] |
//! | Worker | [`Error::Panicked`] |

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for parmig operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Check if an IO error indicates "no space left on device".
///
/// # Example
///
/// ```
/// use std::io;
/// use parmig::is_no_space_error;
///
/// let error = io::Error::new(io::ErrorKind::StorageFull, "disk full");
/// assert!(is_no_space_error(&error));
/// ```
pub fn is_no_space_error(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::StorageFull {
        return true;
    }

    #[cfg(unix)]
    {
        if let Some(raw_error) = error.raw_os_error() {
            return raw_error == libc::ENOSPC;
        }
    }

    false
}

/// The step of a per-file job at which a failure happened.
///
/// Each stage maps to a distinct small integer ([`Stage::code`]) so a
/// failure can be attributed from the log line or the process exit status
/// alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Stage {
    /// A unit of execution could not be created
    Spawn,
    /// The source file could not be opened
    SourceOpen,
    /// The destination (temporary) file could not be created
    DestinationOpen,
    /// Writing to the destination failed
    Write,
    /// Reading from the source failed
    Read,
    /// Flushing the destination to durable storage failed
    Flush,
    /// The destination could not be reopened for verification
    VerifyOpen,
    /// Reading the destination back during verification failed
    VerifyRead,
    /// The verified file could not be moved into place
    Commit,
    /// The checksum ledger could not be written or read
    Ledger,
    /// Source and destination digests differ
    Mismatch,
}

impl Stage {
    /// Distinct exit code for this stage.
    pub const fn code(self) -> i32 {
        match self {
            Self::Spawn => 2,
            Self::SourceOpen => 3,
            Self::DestinationOpen => 4,
            Self::Write => 5,
            Self::Read => 6,
            Self::Flush => 7,
            Self::VerifyOpen => 8,
            Self::VerifyRead => 9,
            Self::Commit => 10,
            Self::Ledger => 11,
            Self::Mismatch => 12,
        }
    }

    /// Short lowercase name used in log lines and reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spawn => "spawn",
            Self::SourceOpen => "source-open",
            Self::DestinationOpen => "destination-open",
            Self::Write => "write",
            Self::Read => "read",
            Self::Flush => "flush",
            Self::VerifyOpen => "verify-open",
            Self::VerifyRead => "verify-read",
            Self::Commit => "commit",
            Self::Ledger => "ledger",
            Self::Mismatch => "mismatch",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during a migration.
///
/// All errors include relevant path information to aid debugging.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// IO error outside of any per-file stage
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A per-file job failed at the given stage
    #[error("{stage} failed for {path}: {source}")]
    Job {
        /// Stage at which the job failed
        stage: Stage,
        /// Path the failing operation was applied to
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Digest of the destination differs from the digest of the source
    #[error("digest mismatch for {path}: expected {expected}, found {actual}")]
    Mismatch {
        /// Destination path
        path: PathBuf,
        /// Digest computed while copying (or recorded in the ledger)
        expected: String,
        /// Digest computed from the destination
        actual: String,
    },

    /// Source root does not exist
    #[error("Source path does not exist: {0}")]
    SourceNotFound(PathBuf),

    /// Destination directory could not be created
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        /// Destination directory
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Symlink could not be read or recreated
    #[error("Failed to recreate symlink {path}: {source}")]
    Symlink {
        /// Destination link path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Device node could not be created
    #[error("Failed to create device node {path}: {source}")]
    DeviceNode {
        /// Destination node path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// The worker pool could not be started
    #[error("Failed to start worker pool: {0}")]
    Spawn(String),

    /// The checksum ledger could not be opened, written or read
    #[error("Checksum ledger {path}: {source}")]
    Ledger {
        /// Ledger path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// A ledger line is not `<hexdigest>  <path>`
    #[error("Malformed ledger record at line {line}: {content:?}")]
    MalformedRecord {
        /// 1-based line number
        line: usize,
        /// Offending line
        content: String,
    },

    /// A ledger digest has the wrong length for the configured algorithm
    #[error("Ledger record for {path} holds a {found}-character digest, not a {algorithm} digest")]
    ForeignDigest {
        /// Recorded destination path
        path: PathBuf,
        /// Algorithm the replay runs with
        algorithm: String,
        /// Length of the recorded digest
        found: usize,
    },

    /// A job panicked instead of returning
    #[error("job panicked: {0}")]
    Panicked(String),
}

impl Error {
    /// Build a stage-tagged job error.
    pub(crate) fn job(stage: Stage, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Job {
            stage,
            path: path.into(),
            source,
        }
    }

    /// The stage this error belongs to, if it is a per-file failure.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Job { stage, .. } => Some(*stage),
            Self::Mismatch { .. } => Some(Stage::Mismatch),
            Self::Spawn(_) => Some(Stage::Spawn),
            Self::Ledger { .. } | Self::MalformedRecord { .. } | Self::ForeignDigest { .. } => {
                Some(Stage::Ledger)
            }
            _ => None,
        }
    }

    /// Exit code attributed to this error (1 when no stage applies).
    pub fn code(&self) -> i32 {
        self.stage().map_or(1, Stage::code)
    }

    /// Whether this error was caused by a full destination.
    pub fn is_no_space(&self) -> bool {
        match self {
            Self::Io(source)
            | Self::Job { source, .. }
            | Self::CreateDir { source, .. }
            | Self::Symlink { source, .. } => is_no_space_error(source),
            _ => false,
        }
    }
}
