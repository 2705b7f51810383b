//! Configuration options for migrations.
//!
//! This module provides [`MigrateOptions`] for configuring a run and
//! [`OnError`] for choosing what happens after a failure.
//!
//! # Example
//!
//! ```
//! use parmig::{DigestKind, MigrateOptions, OnError};
//!
//! let options = MigrateOptions::default()
//!     .with_parallel(8)
//!     .with_sparse(true)
//!     .with_checksum_file("/var/tmp/migration.sha1")
//!     .with_digest(DigestKind::Sha1)
//!     .with_on_error(OnError::Abort);
//! ```

use crate::digest::DigestKind;
use std::path::PathBuf;

/// What to do after a file, directory or symlink fails.
///
/// A failure to create a directory always skips that directory's subtree,
/// and a full destination always stops dispatch, whatever the policy.
///
/// # Default
///
/// The default is [`OnError::Continue`]: every failure is logged and
/// collected, and the run ends with a non-zero exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OnError {
    /// Keep migrating the rest of the tree (default).
    #[default]
    Continue,
    /// Stop dispatching new work after the first failure.
    ///
    /// Jobs already running are allowed to finish.
    Abort,
}

/// Options for a migration run.
///
/// # Default Values
///
/// | Field | Default | Description |
/// |-------|---------|-------------|
/// | `parallel` | CPU count | Concurrent file jobs |
/// | `sparse` | `false` | Skip holes while copying |
/// | `checksum_file` | `None` | Verify inline instead of via a ledger |
/// | `digest` | `Sha1` | Digest algorithm |
/// | `on_error` | `Continue` | Collect every failure |
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MigrateOptions {
    /// Maximum number of concurrent file jobs (default: number of CPUs)
    pub parallel: usize,

    /// Whether to detect holes and reproduce them on the destination
    pub sparse: bool,

    /// Ledger path for deferred verification (default: None = inline)
    ///
    /// When set, each copied file appends `digest  path` to this file, and
    /// the whole ledger is re-verified once every copy has finished.
    pub checksum_file: Option<PathBuf>,

    /// Digest algorithm (default: SHA-1)
    pub digest: DigestKind,

    /// Failure policy
    pub on_error: OnError,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            parallel: num_cpus::get().max(1),
            sparse: false,
            checksum_file: None,
            digest: DigestKind::Sha1,
            on_error: OnError::Continue,
        }
    }
}

impl MigrateOptions {
    /// Set the number of concurrent file jobs
    ///
    /// Value is clamped to at least 1.
    #[must_use]
    pub fn with_parallel(mut self, n: usize) -> Self {
        self.parallel = n.max(1);
        self
    }

    /// Enable or disable sparse copying
    #[must_use]
    pub fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Record digests to a ledger and verify after the copy phase
    #[must_use]
    pub fn with_checksum_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.checksum_file = Some(path.into());
        self
    }

    /// Set the digest algorithm
    #[must_use]
    pub fn with_digest(mut self, digest: DigestKind) -> Self {
        self.digest = digest;
        self
    }

    /// Set the failure policy
    #[must_use]
    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }

    /// Whether files are verified inline (no ledger configured)
    pub fn is_inline(&self) -> bool {
        self.checksum_file.is_none()
    }
}
