//! # parmig
//!
//! Parallel, verified migration of directory trees between filesystems.
//!
//! ## Core Features
//!
//! - **Bounded parallelism**: Regular files are copied by a fixed-size worker pool; the tree walk blocks while every worker is busy
//! - **Byte-level verification**: Every copied byte is digested; the destination is reread and compared before it is moved into place
//! - **Deferred verification**: Optionally record `digest  path` lines to a ledger and verify them after the copy phase (`sha1sum -c` compatible)
//! - **Atomic destinations**: Files are written to a temporary file and renamed, so a failed job never leaves a partial file
//! - **Sparse aware**: Holes are detected with `SEEK_DATA`/`SEEK_HOLE` and reproduced instead of written
//! - **Metadata preserving**: Permissions, ownership and timestamps of files, directories and symlinks
//! - **Special files**: Symlinks are recreated verbatim and device nodes are recreated with their major/minor numbers
//! - **Attributable failures**: Each failure carries the stage it happened in, with a distinct exit code per stage
//!
//! ## Quick Start with Builder API
//!
//! ```no_run
//! use parmig::MigrateBuilder;
//!
//! let report = MigrateBuilder::new("/mnt/new")
//!     .source("/mnt/old/data")
//!     .parallel(8)
//!     .run()?;
//! println!("{} files verified, {} failures", report.files_verified, report.failures.len());
//! # Ok::<(), parmig::Error>(())
//! ```
//!
//! ## Function API
//!
//! ```no_run
//! use parmig::{migrate, replay_ledger, MigrateOptions};
//! use std::path::Path;
//!
//! let options = MigrateOptions::default()
//!     .with_sparse(true)
//!     .with_checksum_file("/var/tmp/data.sha1");
//!
//! let report = migrate(&["/mnt/old/data"], Path::new("/mnt/new/data"), &options)?;
//!
//! // Later: check nothing rotted on the new disk
//! let recheck = replay_ledger(Path::new("/var/tmp/data.sha1"), &options)?;
//! assert_eq!(recheck.ledger_mismatches, 0);
//! # Ok::<(), parmig::Error>(())
//! ```
//!
//! ## Log Format
//!
//! Every event is one line on the [`Journal`]:
//!
//! ```text
//! #001: 14:03:58 + /mnt/new/data/
//! #002: 14:03:58 > /mnt/old/data/a.txt -> /mnt/new/data/a.txt
//! #002: 14:03:58 ~ 5 bytes flushed for /mnt/new/data/a.txt
//! #002: 14:03:59 = 3f786850e387550fdab836ed7e6dc881de23001b  /mnt/new/data/a.txt
//! ```
//!
//! ## Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `tracing` | Mirror journal lines to the tracing crate |
//! | `serde` | Serialize/Deserialize for [`MigrateOptions`] |
//! | `full` | Enable all optional features |

#![cfg_attr(docsrs, feature(doc_cfg))]

mod builder;
pub mod digest;
mod error;
pub mod journal;
mod migrate;
mod options;
pub mod pool;

pub use builder::MigrateBuilder;
pub use digest::{DigestAlgorithm, DigestKind, Hasher};
pub use error::{Error, Result, Stage, is_no_space_error};
pub use journal::{Glyph, Journal};
pub use migrate::{
    Boundaries, ChecksumRecord, DeviceId, EntryKind, ExtentScanner, Failure, Job, Ledger,
    MigrationReport, Migrator, NodeKind, NodeMaker, SeekScanner, SourceEntry, SystemNodeMaker,
    destination_for, migrate, replay_ledger,
};
pub use options::{MigrateOptions, OnError};
