//! Core migration engine.
//!
//! The tree walker ([`walk`]) drives everything: directories, symlinks and
//! device nodes are handled synchronously while regular files are submitted
//! to the [`WorkerPool`](crate::pool::WorkerPool). Each file job streams the
//! source into a temporary destination ([`stream`]), then verifies it inline
//! or appends it to the checksum ledger ([`verify`], [`ledger`]), and finally
//! replicates metadata ([`meta`]).

pub(crate) mod extent;
pub(crate) mod ledger;
pub(crate) mod meta;
pub(crate) mod special;
pub(crate) mod stream;
pub(crate) mod verify;
pub(crate) mod walk;

use crate::digest::DigestAlgorithm;
use crate::error::{Error, Result, Stage};
use crate::journal::{Glyph, Journal};
use crate::options::{MigrateOptions, OnError};
use crate::pool::WorkerPool;
use filetime::FileTime;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub use extent::{Boundaries, ExtentScanner, SeekScanner};
pub use ledger::{ChecksumRecord, Ledger};
pub use special::{DeviceId, NodeKind, NodeMaker, SystemNodeMaker};

/// Type of a source entry, from a non-following stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file: streamed, digested and verified
    Regular,
    /// Directory: mirrored and recursed into
    Directory,
    /// Symbolic link: recreated with the same target
    Symlink,
    /// Block device node
    BlockDevice,
    /// Character device node
    CharDevice,
    /// FIFO, socket or anything else: skipped
    Other,
}

/// Immutable status snapshot of a source path.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    /// Source path
    pub path: PathBuf,
    /// Entry type
    pub kind: EntryKind,
    /// Raw mode bits (type bits included on Unix)
    pub mode: u32,
    /// Owner user id
    pub uid: u32,
    /// Owner group id
    pub gid: u32,
    /// Logical size in bytes
    pub size: u64,
    /// Last access time
    pub atime: FileTime,
    /// Last modification time
    pub mtime: FileTime,
    /// Allocated 512-byte blocks
    pub blocks: u64,
    /// Raw device identifier (device nodes only)
    pub rdev: u64,
}

impl SourceEntry {
    /// Stat `path` without following a final symlink.
    pub fn stat(path: &Path) -> io::Result<Self> {
        let meta = fs::symlink_metadata(path)?;
        Ok(Self::from_metadata(path, &meta))
    }

    /// Build a snapshot from already-fetched metadata.
    pub fn from_metadata(path: &Path, meta: &Metadata) -> Self {
        let (mode, uid, gid, blocks, rdev) = raw_fields(meta);
        Self {
            path: path.to_path_buf(),
            kind: classify(meta),
            mode,
            uid,
            gid,
            size: meta.len(),
            atime: FileTime::from_last_access_time(meta),
            mtime: FileTime::from_last_modification_time(meta),
            blocks,
            rdev,
        }
    }

    /// Standard permission bits (`rwxrwxrwx`), special bits dropped.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o777
    }
}

fn classify(meta: &Metadata) -> EntryKind {
    let ft = meta.file_type();
    if ft.is_symlink() {
        return EntryKind::Symlink;
    }
    if ft.is_dir() {
        return EntryKind::Directory;
    }
    if ft.is_file() {
        return EntryKind::Regular;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if ft.is_block_device() {
            return EntryKind::BlockDevice;
        }
        if ft.is_char_device() {
            return EntryKind::CharDevice;
        }
    }
    EntryKind::Other
}

#[cfg(unix)]
fn raw_fields(meta: &Metadata) -> (u32, u32, u32, u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.mode(), meta.uid(), meta.gid(), meta.blocks(), meta.rdev())
}

#[cfg(not(unix))]
fn raw_fields(meta: &Metadata) -> (u32, u32, u32, u64, u64) {
    let mode = if meta.permissions().readonly() { 0o444 } else { 0o644 };
    // No block count available: report the file as fully allocated.
    (mode, 0, 0, meta.len().div_ceil(512), 0)
}

/// Destination for `src`: the `root` prefix replaced by `dest_root`.
pub fn destination_for(src: &Path, root: &Path, dest_root: &Path) -> PathBuf {
    match src.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => dest_root.to_path_buf(),
        Ok(rel) => dest_root.join(rel),
        Err(_) => dest_root.join(src.file_name().unwrap_or(src.as_os_str())),
    }
}

/// A scheduled regular-file copy.
///
/// The id only attributes log lines; it carries no ordering meaning.
#[derive(Debug, Clone)]
pub struct Job {
    /// Correlation id for log attribution
    pub id: u64,
    /// Source snapshot
    pub entry: SourceEntry,
    /// Destination path
    pub dst: PathBuf,
}

/// One failed job or entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Correlation id of the job (0 for run-level failures)
    pub id: u64,
    /// Path the failure concerns
    pub path: PathBuf,
    /// Stage, when the failure happened inside a file job
    pub stage: Option<Stage>,
    /// Exit code attributed to the failure
    pub code: i32,
    /// Human-readable description
    pub message: String,
}

/// Outcome of a migration or ledger replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Destination directories created
    pub dirs_created: u64,
    /// Regular files copied and verified inline
    pub files_verified: u64,
    /// Regular files copied and recorded in the ledger
    pub files_recorded: u64,
    /// Bytes physically written to destinations
    pub bytes_copied: u64,
    /// Symlinks recreated
    pub symlinks_created: u64,
    /// Device nodes created
    pub devices_created: u64,
    /// Non-fatal warnings logged
    pub warnings: u64,
    /// Inline verifications that failed (destination removed)
    pub mismatches: u64,
    /// Ledger records whose destination still matches
    pub ledger_matches: u64,
    /// Ledger records whose destination no longer matches
    pub ledger_mismatches: u64,
    /// Every failure, in completion order
    pub failures: Vec<Failure>,
    /// Whether dispatch stopped early
    pub aborted: bool,
    /// Highest number of concurrently running jobs
    pub peak_in_flight: usize,
    /// Wall-clock duration
    pub duration: Duration,
}

impl MigrationReport {
    /// True when nothing failed and no digest mismatched.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.aborted
    }
}

/// State shared by the walker and every job of one run.
pub(crate) struct JobContext {
    pub(crate) journal: Journal,
    pub(crate) algorithm: Arc<dyn DigestAlgorithm>,
    pub(crate) scanner: Arc<dyn ExtentScanner>,
    pub(crate) nodes: Arc<dyn NodeMaker>,
    pub(crate) ledger: Option<Ledger>,
    pub(crate) sparse: bool,
    on_error: OnError,
    report: Mutex<MigrationReport>,
    next_id: AtomicU64,
    stop: AtomicBool,
}

impl JobContext {
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Whether dispatch must stop (abort policy or full destination).
    pub(crate) fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub(crate) fn tally(&self, update: impl FnOnce(&mut MigrationReport)) {
        update(&mut self.report.lock().unwrap_or_else(|e| e.into_inner()));
    }

    pub(crate) fn warn(&self, id: u64, message: impl AsRef<str>) {
        self.journal.log(id, Glyph::Warning, message);
        self.tally(|r| r.warnings += 1);
    }

    /// Log and record a failure, stopping dispatch when the policy says so.
    pub(crate) fn fail(&self, id: u64, path: &Path, error: Error) {
        let code = error.code();
        match &error {
            Error::Mismatch { .. } => self.journal.log(id, Glyph::Mismatch, error.to_string()),
            _ => self
                .journal
                .log(id, Glyph::Fatal, format!("[code {code}] {error}")),
        }

        if self.on_error == OnError::Abort || error.is_no_space() {
            self.stop.store(true, Ordering::SeqCst);
        }

        self.tally(|r| {
            r.failures.push(Failure {
                id,
                path: path.to_path_buf(),
                stage: error.stage(),
                code,
                message: error.to_string(),
            })
        });
    }

    fn into_report(self) -> MigrationReport {
        let mut report = self.report.into_inner().unwrap_or_else(|e| e.into_inner());
        report.aborted = self.stop.load(Ordering::SeqCst);
        report
    }
}

/// Migration engine with its pluggable seams.
///
/// Prefer [`MigrateBuilder`](crate::MigrateBuilder) for one-off runs.
#[derive(Clone)]
pub struct Migrator {
    options: MigrateOptions,
    journal: Journal,
    algorithm: Option<Arc<dyn DigestAlgorithm>>,
    scanner: Arc<dyn ExtentScanner>,
    nodes: Arc<dyn NodeMaker>,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Migrator {
    /// Create an engine logging to standard output.
    pub fn new(options: MigrateOptions) -> Self {
        Self {
            options,
            journal: Journal::stdout(),
            algorithm: None,
            scanner: Arc::new(SeekScanner),
            nodes: Arc::new(SystemNodeMaker),
        }
    }

    /// Options this engine runs with.
    pub fn options(&self) -> &MigrateOptions {
        &self.options
    }

    /// Replace the options.
    #[must_use]
    pub fn with_options(mut self, options: MigrateOptions) -> Self {
        self.options = options;
        self
    }

    /// Log to `journal` instead of standard output.
    #[must_use]
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Use a custom digest algorithm instead of `options.digest`.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Arc<dyn DigestAlgorithm>) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Use a custom extent scanner for sparse copies.
    #[must_use]
    pub fn with_scanner(mut self, scanner: Arc<dyn ExtentScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    /// Use a custom device-node creator.
    #[must_use]
    pub fn with_node_maker(mut self, nodes: Arc<dyn NodeMaker>) -> Self {
        self.nodes = nodes;
        self
    }

    fn context(&self, ledger: Option<Ledger>) -> JobContext {
        JobContext {
            journal: self.journal.clone(),
            algorithm: self
                .algorithm
                .clone()
                .unwrap_or_else(|| Arc::new(self.options.digest) as Arc<dyn DigestAlgorithm>),
            scanner: Arc::clone(&self.scanner),
            nodes: Arc::clone(&self.nodes),
            ledger,
            sparse: self.options.sparse,
            on_error: self.options.on_error,
            report: Mutex::new(MigrationReport::default()),
            next_id: AtomicU64::new(0),
            stop: AtomicBool::new(false),
        }
    }

    fn pool(&self, ctx: &Arc<JobContext>) -> Result<WorkerPool> {
        let weak = Arc::downgrade(ctx);
        Ok(WorkerPool::new(self.options.parallel)?.with_panic_handler(Arc::new(
            move |message: String| {
                if let Some(ctx) = weak.upgrade() {
                    ctx.fail(0, Path::new(""), Error::Panicked(message));
                }
            },
        )))
    }

    /// Migrate every source root into `dest`.
    ///
    /// Per-entry failures do not make this return `Err`; they are logged and
    /// collected in the returned [`MigrationReport`].
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A source root does not exist ([`Error::SourceNotFound`])
    /// - The ledger cannot be created, flushed or reread ([`Error::Ledger`])
    /// - The worker pool cannot start ([`Error::Spawn`])
    /// - `dest` cannot be made absolute ([`Error::Io`])
    pub fn run<P: AsRef<Path>>(&self, sources: &[P], dest: &Path) -> Result<MigrationReport> {
        let start_time = Instant::now();

        for src in sources {
            let src = src.as_ref();
            if fs::symlink_metadata(src).is_err() {
                return Err(Error::SourceNotFound(src.to_path_buf()));
            }
        }

        // Ledger records must stay valid from any working directory.
        let dest = std::path::absolute(dest)?;
        let dest = dest.as_path();

        let ledger = match &self.options.checksum_file {
            Some(path) => Some(Ledger::create(path)?),
            None => None,
        };
        let ctx = Arc::new(self.context(ledger));
        let pool = self.pool(&ctx)?;

        ctx.journal.log(
            0,
            Glyph::Info,
            format!(
                "migrating {} source(s) to {} with {} worker(s), {} {}{}",
                sources.len(),
                dest.display(),
                pool.capacity(),
                ctx.algorithm.name(),
                if ctx.ledger.is_some() { "deferred" } else { "inline" },
                if ctx.sparse { ", sparse" } else { "" },
            ),
        );

        for src in sources {
            if ctx.should_stop() {
                break;
            }
            walk::walk_root(&ctx, &pool, src.as_ref(), dest);
        }
        pool.drain();

        if let Some(ledger) = &ctx.ledger {
            ledger.finish()?;
            if !ctx.should_stop() {
                verify::replay(&ctx, &pool, ledger.path())?;
                pool.drain();
            }
        }

        Ok(finish(ctx, &pool, start_time))
    }

    /// Re-verify every record of an existing ledger against the destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or the pool cannot start.
    pub fn replay(&self, ledger_path: &Path) -> Result<MigrationReport> {
        let start_time = Instant::now();
        let ctx = Arc::new(self.context(None));
        let pool = self.pool(&ctx)?;

        verify::replay(&ctx, &pool, ledger_path)?;
        pool.drain();

        Ok(finish(ctx, &pool, start_time))
    }
}

fn finish(ctx: Arc<JobContext>, pool: &WorkerPool, start_time: Instant) -> MigrationReport {
    pool.drain();
    let peak = pool.peak();
    let journal = ctx.journal.clone();

    let mut report = match Arc::try_unwrap(ctx) {
        Ok(ctx) => ctx.into_report(),
        Err(shared) => {
            let mut report = shared
                .report
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            report.aborted = shared.should_stop();
            report
        }
    };
    report.peak_in_flight = peak;
    report.duration = start_time.elapsed();

    journal.log(
        0,
        Glyph::Info,
        format!(
            "done: {} verified, {} recorded, {} ledger match(es), {} failure(s), {} warning(s)",
            report.files_verified,
            report.files_recorded,
            report.ledger_matches,
            report.failures.len(),
            report.warnings
        ),
    );
    let _ = journal.flush();
    report
}

/// Migrate `sources` into `dest` with default seams, logging to standard output.
///
/// # Example
///
/// ```no_run
/// use parmig::{migrate, MigrateOptions};
/// use std::path::Path;
///
/// let report = migrate(&["/mnt/old/data"], Path::new("/mnt/new/data"), &MigrateOptions::default())?;
/// println!("{} files verified", report.files_verified);
/// # Ok::<(), parmig::Error>(())
/// ```
///
/// # Errors
///
/// See [`Migrator::run`].
pub fn migrate<P: AsRef<Path>>(
    sources: &[P],
    dest: &Path,
    options: &MigrateOptions,
) -> Result<MigrationReport> {
    Migrator::new(options.clone()).run(sources, dest)
}

/// Replay a checksum ledger, logging to standard output.
///
/// # Errors
///
/// See [`Migrator::replay`].
pub fn replay_ledger(ledger_path: &Path, options: &MigrateOptions) -> Result<MigrationReport> {
    Migrator::new(options.clone()).replay(ledger_path)
}
