//! pmig - Parallel verified migration
//!
//! Moves directory trees between mountpoints with every copied byte verified,
//! powered by parmig.

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use parmig::{
    DigestAlgorithm, DigestKind, Error as ParmigError, Journal, MigrateBuilder, MigrationReport,
};
use serde_json::{Value, json};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Exit status when at least one job failed or mismatched.
const EXIT_FAILURES: i32 = 1;
/// Exit status for invalid invocations.
const EXIT_USAGE: i32 = 2;
/// Exit status when the run could not start or finish its setup.
const EXIT_SETUP: i32 = 3;

/// pmig - Parallel verified tree migration
///
/// Copy one or more source trees to a destination, verifying every regular
/// file with a cryptographic digest. Directories, symlinks and device nodes
/// are recreated; ownership, permissions and timestamps are preserved.
///
/// Usage:
///   pmig SOURCE DEST
///   pmig SOURCE... DIRECTORY
///   pmig --replay MANIFEST
#[derive(Parser, Debug)]
#[command(name = "pmig", version, about, long_about = None)]
struct Args {
    /// Source roots followed by the destination root
    #[arg(value_name = "PATH", required_unless_present = "replay")]
    paths: Vec<PathBuf>,

    /// Record digests to this manifest and verify after all copies finish
    ///
    /// The manifest uses the `sha1sum` format (`<digest>  <path>`).
    #[arg(long, value_name = "PATH")]
    checksum_file: Option<PathBuf>,

    /// Append the event log to this file instead of standard output
    #[arg(long, value_name = "PATH", conflicts_with = "log_stderr")]
    log_file: Option<PathBuf>,

    /// Write the event log to standard error
    #[arg(long)]
    log_stderr: bool,

    /// Detect holes in sparse files and reproduce them
    #[arg(long)]
    sparse: bool,

    /// Number of concurrent file jobs (default: number of CPUs)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Digest algorithm
    #[arg(long, value_enum, default_value = "sha1")]
    digest: DigestArg,

    /// Stop starting new work after the first failure
    #[arg(long)]
    abort_on_error: bool,

    /// Only re-verify an existing manifest
    #[arg(long, value_name = "MANIFEST", conflicts_with_all = ["checksum_file", "sparse"])]
    replay: Option<PathBuf>,

    /// Summary format
    #[arg(long, value_enum, default_value = "human")]
    output: OutputMode,

    /// Do not print the summary
    #[arg(short = 'q', long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DigestArg {
    Sha1,
    Sha256,
    Blake3,
}

impl From<DigestArg> for DigestKind {
    fn from(arg: DigestArg) -> Self {
        match arg {
            DigestArg::Sha1 => DigestKind::Sha1,
            DigestArg::Sha256 => DigestKind::Sha256,
            DigestArg::Blake3 => DigestKind::Blake3,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
enum CliError {
    #[error("Missing destination operand after '{operand}'")]
    MissingDestinationOperand { operand: PathBuf },

    #[error("Target '{path}' is not a directory (when migrating multiple sources)")]
    MultiSourceTargetNotDirectory { path: PathBuf },

    #[error("Failed to create destination directory: {path}: {source}")]
    CreateDestination { path: PathBuf, source: io::Error },

    #[error("Failed to open log file: {path}: {source}")]
    LogFile { path: PathBuf, source: io::Error },

    #[error("{source}")]
    Migrate { source: ParmigError },

    #[error("Failed to serialize JSON output: {source}")]
    JsonSerialize { source: serde_json::Error },
}

impl CliError {
    fn kind(&self) -> &'static str {
        match self {
            Self::MissingDestinationOperand { .. } | Self::MultiSourceTargetNotDirectory { .. } => {
                "usage"
            }
            Self::CreateDestination { .. } | Self::LogFile { .. } => "io",
            Self::Migrate { source } => source.stage().map_or("setup", |stage| stage.as_str()),
            Self::JsonSerialize { .. } => "internal",
        }
    }

    fn exit_code(&self) -> i32 {
        match self {
            Self::MissingDestinationOperand { .. } | Self::MultiSourceTargetNotDirectory { .. } => {
                EXIT_USAGE
            }
            _ => EXIT_SETUP,
        }
    }
}

impl From<ParmigError> for CliError {
    fn from(source: ParmigError) -> Self {
        Self::Migrate { source }
    }
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_FAILURES),
        Err(error) => {
            eprintln!("error[{}]: {}", error.kind(), error);
            std::process::exit(error.exit_code());
        }
    }
}

/// Returns whether the run was clean.
fn run() -> CliResult<bool> {
    let args = Args::parse();

    if let Some(manifest) = &args.replay {
        let builder = configure(MigrateBuilder::new("."), &args)?;
        let pb = spinner(&args, format!("Verifying {}...", manifest.display()));
        let result = builder.replay(manifest);
        finish_spinner(pb);

        let report = result?;
        emit_summary(&args, "replay", &report)?;
        return Ok(report.is_clean());
    }

    let (sources, dest) = resolve_sources_and_dest(&args.paths)?;
    let mut builder = configure(MigrateBuilder::new(&dest).sources(&sources), &args)?;
    if args.sparse {
        builder = builder.sparse();
    }
    if let Some(manifest) = &args.checksum_file {
        builder = builder.checksum_file(manifest);
    }

    let message = if sources.len() == 1 {
        format!("Migrating {}...", sources[0].display())
    } else {
        format!("Migrating {} sources...", sources.len())
    };
    let pb = spinner(&args, message);
    let result = builder.run();
    finish_spinner(pb);

    let report = result?;
    emit_summary(&args, "migrate", &report)?;
    Ok(report.is_clean())
}

/// Apply the options shared by migrate and replay runs.
fn configure(mut builder: MigrateBuilder, args: &Args) -> CliResult<MigrateBuilder> {
    builder = builder
        .journal(open_journal(args)?)
        .digest(args.digest.into());
    if let Some(jobs) = args.jobs {
        builder = builder.parallel(jobs);
    }
    if args.abort_on_error {
        builder = builder.abort_on_error();
    }
    Ok(builder)
}

fn open_journal(args: &Args) -> CliResult<Journal> {
    if let Some(path) = &args.log_file {
        Journal::to_file(path).map_err(|source| CliError::LogFile {
            path: path.clone(),
            source,
        })
    } else if args.log_stderr {
        Ok(Journal::stderr())
    } else {
        Ok(Journal::stdout())
    }
}

fn resolve_sources_and_dest(paths: &[PathBuf]) -> CliResult<(Vec<PathBuf>, PathBuf)> {
    match paths {
        [] => Err(CliError::MissingDestinationOperand {
            operand: PathBuf::new(),
        }),
        [only] => Err(CliError::MissingDestinationOperand {
            operand: only.clone(),
        }),
        [src, dest] => Ok((vec![src.clone()], dest.clone())),
        [sources @ .., dest] => {
            if dest.exists() && !dest.is_dir() {
                return Err(CliError::MultiSourceTargetNotDirectory { path: dest.clone() });
            }
            if !dest.exists() {
                std::fs::create_dir_all(dest).map_err(|source| CliError::CreateDestination {
                    path: dest.clone(),
                    source,
                })?;
            }
            Ok((sources.to_vec(), dest.clone()))
        }
    }
}

/// Spinner on stderr, only when the event log is not already on a terminal stream.
fn spinner(args: &Args, message: String) -> Option<ProgressBar> {
    if args.quiet || args.output != OutputMode::Human || args.log_file.is_none() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg} [{elapsed}]")
        .ok()?;
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message);
    Some(pb)
}

fn finish_spinner(pb: Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
}

fn emit_summary(args: &Args, mode: &str, report: &MigrationReport) -> CliResult<()> {
    if args.quiet {
        return Ok(());
    }
    match args.output {
        OutputMode::Human => {
            print_report(mode, report);
            Ok(())
        }
        OutputMode::Json => {
            let digest = DigestKind::from(args.digest);
            let payload = json!({
                "schema_version": "1.0",
                "mode": mode,
                "digest": digest.name(),
                "clean": report.is_clean(),
                "report": report_json(report),
            });
            let serialized = serde_json::to_string(&payload)
                .map_err(|source| CliError::JsonSerialize { source })?;
            eprintln!("{serialized}");
            Ok(())
        }
    }
}

fn report_json(report: &MigrationReport) -> Value {
    let failures: Vec<Value> = report
        .failures
        .iter()
        .map(|failure| {
            json!({
                "id": failure.id,
                "path": display_path(&failure.path),
                "stage": failure.stage.map(|s| s.as_str()),
                "code": failure.code,
                "message": failure.message,
            })
        })
        .collect();

    json!({
        "dirs_created": report.dirs_created,
        "files_verified": report.files_verified,
        "files_recorded": report.files_recorded,
        "bytes_copied": report.bytes_copied,
        "symlinks_created": report.symlinks_created,
        "devices_created": report.devices_created,
        "warnings": report.warnings,
        "mismatches": report.mismatches,
        "ledger_matches": report.ledger_matches,
        "ledger_mismatches": report.ledger_mismatches,
        "aborted": report.aborted,
        "peak_in_flight": report.peak_in_flight,
        "duration_ms": u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
        "failures": failures,
    })
}

fn print_report(mode: &str, report: &MigrationReport) {
    if mode == "replay" {
        eprintln!(
            "Verified {} record(s): {} match, {} mismatch",
            report.ledger_matches + report.ledger_mismatches,
            report.ledger_matches,
            report.ledger_mismatches
        );
    } else {
        let mut parts = vec![];
        if report.files_verified > 0 {
            parts.push(format!("{} verified", report.files_verified));
        }
        if report.files_recorded > 0 {
            parts.push(format!("{} recorded", report.files_recorded));
        }
        if report.symlinks_created > 0 {
            parts.push(format!("{} symlinks", report.symlinks_created));
        }
        if report.devices_created > 0 {
            parts.push(format!("{} devices", report.devices_created));
        }
        if report.dirs_created > 0 {
            parts.push(format!("{} dirs", report.dirs_created));
        }
        if parts.is_empty() {
            eprintln!("Nothing migrated");
        } else {
            eprintln!(
                "Migrated {} ({}) in {:.2}s",
                parts.join(", "),
                format_bytes(report.bytes_copied),
                report.duration.as_secs_f64()
            );
        }
        if report.files_recorded > 0 {
            eprintln!(
                "Manifest check: {} match, {} mismatch",
                report.ledger_matches, report.ledger_mismatches
            );
        }
    }

    if report.warnings > 0 {
        eprintln!("{} warning(s)", report.warnings);
    }
    if report.aborted {
        eprintln!("Aborted: remaining entries were not processed");
    }
    if !report.failures.is_empty() {
        eprintln!("{} failure(s):", report.failures.len());
        for failure in &report.failures {
            eprintln!("  [code {}] {}", failure.code, failure.message);
        }
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
