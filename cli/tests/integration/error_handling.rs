//! Error handling integration tests for pmig CLI.
//!
//! Exit statuses: 0 clean, 1 job failures, 2 usage errors, 3 setup errors.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use rstest::rstest;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

/// Source tree whose `a` directory collides with a file already at the destination.
fn blocked_tree() -> (TempDir, TempDir) {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::create_dir_all(src.path().join("a")).unwrap();
    fs::write(src.path().join("a/inner.txt"), "inner").unwrap();
    fs::write(src.path().join("z.txt"), "last").unwrap();
    fs::write(dst.path().join("a"), "in the way").unwrap();
    (src, dst)
}

#[test]
fn test_missing_destination_operand() {
    let src = TempDir::new().unwrap();

    cargo_bin_cmd!("pmig")
        .arg(src.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[usage]"))
        .stderr(predicate::str::contains("Missing destination operand"));
}

#[test]
fn test_no_arguments_is_usage_error() {
    cargo_bin_cmd!("pmig").assert().code(2);
}

#[test]
fn test_nonexistent_source() {
    let dst = TempDir::new().unwrap();

    cargo_bin_cmd!("pmig")
        .arg("/nonexistent/path/to/nowhere")
        .arg(dst.path().join("out"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error[setup]"));

    assert!(!dst.path().join("out").exists());
}

#[test]
fn test_multiple_sources_into_file() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "a").unwrap();
    fs::write(src.path().join("b.txt"), "b").unwrap();
    fs::write(dst.path().join("file"), "not a directory").unwrap();

    cargo_bin_cmd!("pmig")
        .arg(src.path().join("a.txt"))
        .arg(src.path().join("b.txt"))
        .arg(dst.path().join("file"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("is not a directory"));
}

#[rstest]
#[case::replay_with_sparse(&["--replay", "sums", "--sparse"])]
#[case::replay_with_checksum_file(&["--replay", "sums", "--checksum-file", "other"])]
#[case::both_log_sinks(&["--log-stderr", "--log-file", "log", "src", "out"])]
#[case::unknown_digest(&["--digest", "md5", "src", "out"])]
fn test_invalid_flag_combinations_rejected(#[case] args: &[&str]) {
    let work = TempDir::new().unwrap();
    fs::create_dir(work.path().join("src")).unwrap();

    cargo_bin_cmd!("pmig")
        .current_dir(work.path())
        .args(args)
        .assert()
        .code(2);

    assert!(!work.path().join("out").exists());
}

#[test]
fn test_unwritable_log_file() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "a").unwrap();

    cargo_bin_cmd!("pmig")
        .arg("--log-file")
        .arg(dst.path().join("missing-dir/pmig.log"))
        .arg(src.path())
        .arg(dst.path().join("out"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Failed to open log file"));
}

#[test]
fn test_failures_continue_by_default() {
    let (src, dst) = blocked_tree();

    cargo_bin_cmd!("pmig")
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("x [code 1]"))
        .stderr(predicate::str::contains("1 failure(s)"));

    // The blocked subtree is skipped, the rest of the tree is migrated.
    assert_eq!(fs::read_to_string(dst.path().join("a")).unwrap(), "in the way");
    assert_eq!(fs::read_to_string(dst.path().join("z.txt")).unwrap(), "last");
}

#[test]
fn test_abort_on_error_stops_dispatch() {
    let (src, dst) = blocked_tree();

    cargo_bin_cmd!("pmig")
        .arg("--abort-on-error")
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Aborted"));

    assert!(!dst.path().join("z.txt").exists());
}

#[test]
fn test_json_summary() {
    let (src, dst) = blocked_tree();
    let log = TempDir::new().unwrap();

    let output = cargo_bin_cmd!("pmig")
        .args(["--output", "json", "--log-file"])
        .arg(log.path().join("pmig.log"))
        .arg(src.path())
        .arg(dst.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8(output.stderr).unwrap();
    let line = stderr
        .lines()
        .rev()
        .find(|line| line.starts_with('{'))
        .unwrap();
    let payload: Value = serde_json::from_str(line).unwrap();

    assert_eq!(payload["schema_version"], "1.0");
    assert_eq!(payload["mode"], "migrate");
    assert_eq!(payload["digest"], "sha1");
    assert_eq!(payload["clean"], false);
    assert_eq!(payload["report"]["files_verified"], 1);
    let failures = payload["report"]["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["path"], dst.path().join("a").display().to_string());
    assert_eq!(failures[0]["stage"], Value::Null);
}

#[test]
fn test_quiet_suppresses_summary() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "a").unwrap();

    cargo_bin_cmd!("pmig")
        .arg("-q")
        .arg(src.path())
        .arg(dst.path().join("out"))
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}
