//! Per-file job protocol and digest verification.
//!
//! A regular-file job runs these steps, failing at the first error with the
//! stage it happened in:
//!
//! 1. open the source and a temporary file next to the destination
//! 2. stream the content through the digest ([`super::stream`])
//! 3. flush the temporary file to durable storage
//! 4. inline mode: reread it through a fresh digest and compare, then move
//!    it into place. Deferred mode: move it into place and append a
//!    [`ChecksumRecord`] to the ledger
//! 5. replicate metadata
//!
//! A failed job leaves no partial file behind. Ledger replay reruns only the
//! read-back half of step 4 for each record.

use super::ledger::{self, ChecksumRecord};
use super::stream::{self, Copied};
use super::{Job, JobContext, meta};
use crate::digest::{DigestAlgorithm, digest_reader};
use crate::error::{Error, Result, Stage};
use crate::journal::Glyph;
use crate::pool::WorkerPool;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

/// Digest a destination file, tagging failures with verify stages.
pub(crate) fn digest_destination(algorithm: &dyn DigestAlgorithm, path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::job(Stage::VerifyOpen, path, e))?;
    digest_reader(algorithm, file).map_err(|e| Error::job(Stage::VerifyRead, path, e))
}

/// Failures from these stages happen after the destination was replaced.
fn destination_touched(error: &Error) -> bool {
    !matches!(
        error.stage(),
        Some(Stage::SourceOpen) | Some(Stage::DestinationOpen) | None
    )
}

/// Run one regular-file job to completion, reporting through `ctx`.
pub(crate) fn run_copy_job(ctx: &JobContext, job: Job) {
    ctx.journal.log(
        job.id,
        Glyph::Copy,
        format!("{} -> {}", job.entry.path.display(), job.dst.display()),
    );

    match copy_file(ctx, &job) {
        Ok(copied) => {
            ctx.tally(|r| {
                r.bytes_copied += copied.bytes_written;
                if ctx.ledger.is_some() {
                    r.files_recorded += 1;
                } else {
                    r.files_verified += 1;
                }
            });
            for warning in meta::replicate(&job.entry.path, &job.dst) {
                ctx.warn(job.id, warning);
            }
        }
        Err(error) => {
            if destination_touched(&error) {
                discard(&job.dst);
            }
            if matches!(error, Error::Mismatch { .. }) {
                ctx.tally(|r| r.mismatches += 1);
            }
            ctx.fail(job.id, &job.dst, error);
        }
    }
}

/// Remove a stale or unverified regular file at `path`.
fn discard(path: &Path) {
    if fs::symlink_metadata(path).is_ok_and(|m| m.is_file()) {
        let _ = fs::remove_file(path);
    }
}

fn copy_file(ctx: &JobContext, job: &Job) -> Result<Copied> {
    let src_path = &job.entry.path;
    let dst_path = &job.dst;

    let src = File::open(src_path).map_err(|e| Error::job(Stage::SourceOpen, src_path, e))?;

    let parent = dst_path.parent().unwrap_or(Path::new("."));
    let temp = tempfile::Builder::new()
        .prefix(".parmig-")
        .tempfile_in(parent)
        .map_err(|e| Error::job(Stage::DestinationOpen, dst_path, e))?;

    // Size and allocation come from the walker's snapshot of the entry.
    let scanner = ctx.sparse.then_some(ctx.scanner.as_ref());
    let copied = stream::copy_stream(
        &src,
        temp.as_file(),
        job.entry.size,
        job.entry.blocks,
        scanner,
        ctx.algorithm.hasher(),
    )
        .map_err(|(stage, e)| match stage {
            Stage::Read => Error::job(stage, src_path, e),
            _ => Error::job(stage, dst_path, e),
        })?;

    temp.as_file()
        .sync_all()
        .map_err(|e| Error::job(Stage::Flush, dst_path, e))?;
    ctx.journal.log(
        job.id,
        Glyph::Flush,
        format!("{} bytes flushed for {}", copied.bytes_written, dst_path.display()),
    );

    match &ctx.ledger {
        None => {
            let actual = digest_destination(ctx.algorithm.as_ref(), temp.path())?;
            if actual != copied.digest {
                return Err(Error::Mismatch {
                    path: dst_path.clone(),
                    expected: copied.digest,
                    actual,
                });
            }
            commit(temp, dst_path)?;
            ctx.journal.log(
                job.id,
                Glyph::Match,
                format!("{}  {}", copied.digest, dst_path.display()),
            );
        }
        Some(ledger) => {
            commit(temp, dst_path)?;
            ledger
                .append(&ChecksumRecord::new(copied.digest.clone(), dst_path.clone()))
                .map_err(|e| Error::job(Stage::Ledger, ledger.path(), e))?;
            ctx.journal.log(
                job.id,
                Glyph::Record,
                format!("{}  {}", copied.digest, dst_path.display()),
            );
        }
    }

    Ok(copied)
}

fn commit(temp: tempfile::NamedTempFile, dst: &Path) -> Result<()> {
    temp.persist(dst)
        .map(drop)
        .map_err(|e| Error::job(Stage::Commit, dst, e.error))
}

// =============================================================================
// Ledger replay
// =============================================================================

/// Submit a verify-only job for every record of the ledger at `path`.
///
/// Malformed lines and digests of the wrong length are counted as
/// failures; nothing is ever deleted.
///
/// # Errors
///
/// Returns [`Error::Ledger`] if the ledger cannot be read at all.
pub(crate) fn replay(ctx: &Arc<JobContext>, pool: &WorkerPool, path: &Path) -> Result<()> {
    let records = ledger::read_records(path)?;
    ctx.journal.log(
        0,
        Glyph::Info,
        format!("verifying {} record(s) from {}", records.len(), path.display()),
    );

    for record in records {
        if ctx.should_stop() {
            break;
        }
        let id = ctx.next_id();
        match record {
            Ok(record) if !fits(ctx.algorithm.as_ref(), &record) => {
                let error = Error::ForeignDigest {
                    path: record.path.clone(),
                    algorithm: ctx.algorithm.name().to_owned(),
                    found: record.digest.len(),
                };
                ctx.fail(id, &record.path, error);
            }
            Ok(record) => {
                let ctx = Arc::clone(ctx);
                pool.submit(move || run_verify_job(&ctx, id, record));
            }
            Err(error) => ctx.fail(id, path, error),
        }
    }
    Ok(())
}

/// Whether a record's digest could have come from `algorithm`.
fn fits(algorithm: &dyn DigestAlgorithm, record: &ChecksumRecord) -> bool {
    algorithm
        .digest_len()
        .is_none_or(|len| len == record.digest.len())
}

/// Recompute the digest of one recorded destination and compare.
pub(crate) fn run_verify_job(ctx: &JobContext, id: u64, record: ChecksumRecord) {
    let actual = match digest_destination(ctx.algorithm.as_ref(), &record.path) {
        Ok(actual) => actual,
        Err(error) => return ctx.fail(id, &record.path, error),
    };

    if actual == record.digest {
        ctx.journal.log(
            id,
            Glyph::Match,
            format!("{}  {}", actual, record.path.display()),
        );
        ctx.tally(|r| r.ledger_matches += 1);
    } else {
        ctx.tally(|r| r.ledger_mismatches += 1);
        ctx.fail(
            id,
            &record.path,
            Error::Mismatch {
                path: record.path.clone(),
                expected: record.digest,
                actual,
            },
        );
    }
}
