//! Builder API for ergonomic migrations.
//!
//! The builder pattern provides a fluent interface for configuring and
//! executing a migration. This is often more convenient than constructing
//! [`MigrateOptions`] and a [`Migrator`] by hand.
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```no_run
//! use parmig::MigrateBuilder;
//!
//! // Inline verification, one job per CPU
//! let report = MigrateBuilder::new("/mnt/new")
//!     .source("/mnt/old/home")
//!     .run()?;
//! println!("{} files verified", report.files_verified);
//! # Ok::<(), parmig::Error>(())
//! ```
//!
//! ## Deferred Verification
//!
//! ```no_run
//! use parmig::MigrateBuilder;
//!
//! let report = MigrateBuilder::new("/mnt/new")
//!     .sources(["/mnt/old/home", "/mnt/old/srv"])
//!     .parallel(16)
//!     .sparse()
//!     .checksum_file("/var/tmp/migration.sha1")
//!     .run()?;
//!
//! if !report.is_clean() {
//!     eprintln!("{} failure(s)", report.failures.len());
//! }
//! # Ok::<(), parmig::Error>(())
//! ```

use crate::digest::{DigestAlgorithm, DigestKind};
use crate::error::Result;
use crate::journal::Journal;
use crate::migrate::{ExtentScanner, MigrationReport, Migrator, NodeMaker};
use crate::options::{MigrateOptions, OnError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A builder for configuring and executing a migration.
///
/// # Example
///
/// ```no_run
/// use parmig::{Journal, MigrateBuilder};
/// use std::path::Path;
///
/// let report = MigrateBuilder::new("/backup")
///     .source("/data/project")
///     .parallel(4)
///     .journal(Journal::to_file(Path::new("/var/log/migration.log"))?)
///     .run()?;
/// # Ok::<(), parmig::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct MigrateBuilder {
    sources: Vec<PathBuf>,
    dest: PathBuf,
    migrator: Migrator,
}

impl MigrateBuilder {
    /// Create a builder migrating into `dest`, with default options.
    pub fn new<P: AsRef<Path>>(dest: P) -> Self {
        Self {
            sources: Vec::new(),
            dest: dest.as_ref().to_path_buf(),
            migrator: Migrator::new(MigrateOptions::default()),
        }
    }

    fn map_options(mut self, f: impl FnOnce(MigrateOptions) -> MigrateOptions) -> Self {
        let options = f(self.migrator.options().clone());
        self.migrator = self.migrator.with_options(options);
        self
    }

    /// Add a source root.
    #[must_use]
    pub fn source<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(path.as_ref().to_path_buf());
        self
    }

    /// Add several source roots, migrated in the given order.
    #[must_use]
    pub fn sources<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.sources
            .extend(paths.into_iter().map(|p| p.as_ref().to_path_buf()));
        self
    }

    /// Set the maximum number of concurrent file jobs.
    ///
    /// Default is the number of CPUs. Set to 1 for sequential copying.
    #[must_use]
    pub fn parallel(self, jobs: usize) -> Self {
        self.map_options(|o| o.with_parallel(jobs))
    }

    /// Skip holes in sparse files.
    #[must_use]
    pub fn sparse(self) -> Self {
        self.map_options(|o| o.with_sparse(true))
    }

    /// Record digests to `path` and verify them after all copies finish.
    #[must_use]
    pub fn checksum_file<P: AsRef<Path>>(self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        self.map_options(|o| o.with_checksum_file(path))
    }

    /// Choose a built-in digest algorithm.
    #[must_use]
    pub fn digest(self, kind: DigestKind) -> Self {
        self.map_options(|o| o.with_digest(kind))
    }

    /// Stop dispatching new work after the first failure.
    #[must_use]
    pub fn abort_on_error(self) -> Self {
        self.map_options(|o| o.with_on_error(OnError::Abort))
    }

    /// Log to `journal` instead of standard output.
    #[must_use]
    pub fn journal(mut self, journal: Journal) -> Self {
        self.migrator = self.migrator.with_journal(journal);
        self
    }

    /// Use a custom digest algorithm.
    #[must_use]
    pub fn algorithm(mut self, algorithm: Arc<dyn DigestAlgorithm>) -> Self {
        self.migrator = self.migrator.with_algorithm(algorithm);
        self
    }

    /// Use a custom extent scanner for sparse copies.
    #[must_use]
    pub fn scanner(mut self, scanner: Arc<dyn ExtentScanner>) -> Self {
        self.migrator = self.migrator.with_scanner(scanner);
        self
    }

    /// Use a custom device-node creator.
    #[must_use]
    pub fn node_maker(mut self, nodes: Arc<dyn NodeMaker>) -> Self {
        self.migrator = self.migrator.with_node_maker(nodes);
        self
    }

    /// Get the current options.
    pub fn options(&self) -> &MigrateOptions {
        self.migrator.options()
    }

    /// Execute the migration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A source root doesn't exist
    /// - The checksum ledger cannot be created or reread
    /// - The worker pool cannot be started
    ///
    /// Per-file failures are reported in the returned [`MigrationReport`].
    pub fn run(self) -> Result<MigrationReport> {
        self.migrator.run(&self.sources, &self.dest)
    }

    /// Re-verify an existing ledger instead of migrating.
    ///
    /// Sources and destination are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub fn replay<P: AsRef<Path>>(self, ledger: P) -> Result<MigrationReport> {
        self.migrator.replay(ledger.as_ref())
    }
}
