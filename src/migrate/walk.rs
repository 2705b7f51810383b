//! Tree walker.
//!
//! Visits each source root depth-first in lexical order. Directories,
//! symlinks and device nodes are handled on the calling thread; regular
//! files are submitted to the pool, which blocks the walk whenever every
//! worker is busy.

use super::{EntryKind, Job, JobContext, SourceEntry, destination_for, meta, special, verify};
use crate::error::Error;
use crate::journal::Glyph;
use crate::pool::WorkerPool;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Whether the walk should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Destination of a source root.
///
/// A directory root maps onto `dest` itself. A non-directory root lands
/// inside `dest` when `dest` is an existing directory, else becomes `dest`.
fn root_destination(entry: &SourceEntry, dest: &Path) -> PathBuf {
    if entry.kind != EntryKind::Directory && dest.is_dir() {
        if let Some(name) = entry.path.file_name() {
            return dest.join(name);
        }
    }
    dest.to_path_buf()
}

/// Walk one source root into `dest`.
pub(crate) fn walk_root(ctx: &Arc<JobContext>, pool: &WorkerPool, root: &Path, dest: &Path) {
    let entry = match SourceEntry::stat(root) {
        Ok(entry) => entry,
        Err(e) => return ctx.fail(0, root, Error::Io(e)),
    };
    let dst = root_destination(&entry, dest);

    if entry.kind == EntryKind::Directory {
        if dispatch_dir(ctx, &entry, &dst) {
            walk_dir(ctx, pool, root, root, &dst);
        }
    } else {
        dispatch(ctx, pool, entry, dst, root, dest);
    }
}

fn walk_dir(ctx: &Arc<JobContext>, pool: &WorkerPool, dir: &Path, root: &Path, dest_root: &Path) -> Flow {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            ctx.fail(0, dir, Error::Io(e));
            return Flow::Continue;
        }
    };

    let mut children: Vec<PathBuf> = Vec::new();
    for item in read_dir {
        match item {
            Ok(item) => children.push(item.path()),
            Err(e) => ctx.fail(0, dir, Error::Io(e)),
        }
    }
    children.sort();

    for child in children {
        if ctx.should_stop() {
            return Flow::Stop;
        }
        let entry = match SourceEntry::stat(&child) {
            Ok(entry) => entry,
            Err(e) => {
                ctx.fail(0, &child, Error::Io(e));
                continue;
            }
        };
        let dst = destination_for(&child, root, dest_root);
        if dispatch(ctx, pool, entry, dst, root, dest_root) == Flow::Stop {
            return Flow::Stop;
        }
    }

    Flow::Continue
}

fn dispatch(
    ctx: &Arc<JobContext>,
    pool: &WorkerPool,
    entry: SourceEntry,
    dst: PathBuf,
    root: &Path,
    dest_root: &Path,
) -> Flow {
    match entry.kind {
        EntryKind::Directory => {
            if dispatch_dir(ctx, &entry, &dst) {
                return walk_dir(ctx, pool, &entry.path, root, dest_root);
            }
        }
        EntryKind::Regular => {
            let job = Job {
                id: ctx.next_id(),
                entry,
                dst,
            };
            let ctx = Arc::clone(ctx);
            pool.submit(move || verify::run_copy_job(&ctx, job));
        }
        EntryKind::Symlink => dispatch_symlink(ctx, &entry, &dst),
        EntryKind::BlockDevice | EntryKind::CharDevice => dispatch_device(ctx, &entry, &dst),
        EntryKind::Other => ctx.warn(
            ctx.next_id(),
            format!("skipping unsupported entry {}", entry.path.display()),
        ),
    }

    if ctx.should_stop() { Flow::Stop } else { Flow::Continue }
}

/// Mirror one directory; returns whether its subtree should be walked.
fn dispatch_dir(ctx: &JobContext, entry: &SourceEntry, dst: &Path) -> bool {
    let id = ctx.next_id();
    match meta::ensure_dir(entry, dst) {
        Ok(true) => {
            ctx.journal.log(id, Glyph::Create, format!("{}/", dst.display()));
            ctx.tally(|r| r.dirs_created += 1);
            if let Err(e) = meta::set_owner(dst, entry.uid, entry.gid) {
                ctx.warn(id, format!("chown {}:{} {} failed: {e}", entry.uid, entry.gid, dst.display()));
            }
            true
        }
        Ok(false) => true,
        Err(error) => {
            ctx.fail(id, dst, error);
            false
        }
    }
}

fn dispatch_symlink(ctx: &JobContext, entry: &SourceEntry, dst: &Path) {
    let id = ctx.next_id();
    match special::recreate_symlink(&entry.path, dst) {
        Ok(target) => {
            ctx.journal.log(
                id,
                Glyph::Create,
                format!("{} -> {}", dst.display(), target.display()),
            );
            ctx.tally(|r| r.symlinks_created += 1);
            for warning in special::replicate_link_metadata(entry, dst) {
                ctx.warn(id, warning);
            }
        }
        Err(error) => ctx.fail(id, dst, error),
    }
}

fn dispatch_device(ctx: &JobContext, entry: &SourceEntry, dst: &Path) {
    let id = ctx.next_id();
    match special::create_device(ctx.nodes.as_ref(), entry, dst) {
        Ok(device) => {
            ctx.journal.log(
                id,
                Glyph::Create,
                format!("{} (device {device})", dst.display()),
            );
            ctx.tally(|r| r.devices_created += 1);
        }
        Err(error) => ctx.warn(id, error.to_string()),
    }
}
