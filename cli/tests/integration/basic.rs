//! Basic functionality integration tests for pmig CLI.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_tree_migration() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();

    fs::create_dir_all(src.path().join("subdir/nested")).unwrap();
    fs::write(src.path().join("file1.txt"), "content1").unwrap();
    fs::write(src.path().join("subdir/file2.txt"), "content2").unwrap();
    fs::write(src.path().join("subdir/nested/file3.txt"), "content3").unwrap();

    let target = dst.path().join("migrated");
    let mut cmd = cargo_bin_cmd!("pmig");
    cmd.arg(src.path()).arg(&target).assert().success();

    assert_eq!(fs::read_to_string(target.join("file1.txt")).unwrap(), "content1");
    assert_eq!(
        fs::read_to_string(target.join("subdir/file2.txt")).unwrap(),
        "content2"
    );
    assert_eq!(
        fs::read_to_string(target.join("subdir/nested/file3.txt")).unwrap(),
        "content3"
    );
}

#[test]
fn test_single_file_into_existing_directory() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("test.txt"), "hello world").unwrap();

    let mut cmd = cargo_bin_cmd!("pmig");
    cmd.arg(src.path().join("test.txt"))
        .arg(dst.path())
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(dst.path().join("test.txt")).unwrap(),
        "hello world"
    );
}

#[test]
fn test_single_file_to_new_name() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("test.txt"), "hello world").unwrap();

    let mut cmd = cargo_bin_cmd!("pmig");
    cmd.arg(src.path().join("test.txt"))
        .arg(dst.path().join("renamed.txt"))
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(dst.path().join("renamed.txt")).unwrap(),
        "hello world"
    );
}

#[test]
fn test_multiple_sources_create_destination() {
    let src1 = TempDir::new().unwrap();
    let src2 = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();

    fs::write(src1.path().join("file1.txt"), "content1").unwrap();
    fs::write(src2.path().join("file2.txt"), "content2").unwrap();

    let target = dst.path().join("dest");
    let mut cmd = cargo_bin_cmd!("pmig");
    cmd.arg(src1.path().join("file1.txt"))
        .arg(src2.path().join("file2.txt"))
        .arg(&target)
        .assert()
        .success();

    assert!(target.is_dir());
    assert_eq!(fs::read_to_string(target.join("file1.txt")).unwrap(), "content1");
    assert_eq!(fs::read_to_string(target.join("file2.txt")).unwrap(), "content2");
}

#[test]
fn test_log_lines_follow_format() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "hello").unwrap();

    let target = dst.path().join("out");
    let mut cmd = cargo_bin_cmd!("pmig");
    let output = cmd.arg("-q").arg(src.path()).arg(&target).output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(!stdout.is_empty());
    for line in stdout.lines() {
        let bytes = line.as_bytes();
        assert_eq!(bytes[0], b'#', "bad line: {line}");
        assert!(bytes[1..4].iter().all(u8::is_ascii_digit), "bad id: {line}");
        assert_eq!(&line[4..6], ": ", "bad separator: {line}");
        assert_eq!(bytes[8], b':', "bad clock: {line}");
        assert_eq!(bytes[11], b':', "bad clock: {line}");
        assert_eq!(bytes[14], b' ', "bad clock: {line}");
        assert_eq!(bytes[16], b' ', "bad glyph: {line}");
    }

    let expected = format!(
        "= aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d  {}",
        target.join("a.txt").display()
    );
    assert!(stdout.lines().any(|line| line.ends_with(&expected)));
    assert!(stdout.contains(&format!("+ {}/", target.display())));
}

#[test]
fn test_log_file_and_summary() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "hello").unwrap();
    let log = dst.path().join("pmig.log");

    let mut cmd = cargo_bin_cmd!("pmig");
    cmd.arg("--log-file")
        .arg(&log)
        .arg(src.path())
        .arg(dst.path().join("out"))
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Migrated 1 verified"));

    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"));
}

#[test]
fn test_log_stderr() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "hello").unwrap();

    let mut cmd = cargo_bin_cmd!("pmig");
    cmd.arg("--log-stderr")
        .arg("-q")
        .arg(src.path())
        .arg(dst.path().join("out"))
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"));
}

#[test]
fn test_jobs_flag() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    for i in 0..20 {
        fs::write(src.path().join(format!("file{i}.txt")), format!("content {i}")).unwrap();
    }

    let target = dst.path().join("out");
    let mut cmd = cargo_bin_cmd!("pmig");
    cmd.args(["-j", "2", "-q"])
        .arg(src.path())
        .arg(&target)
        .assert()
        .success();

    for i in 0..20 {
        assert_eq!(
            fs::read_to_string(target.join(format!("file{i}.txt"))).unwrap(),
            format!("content {i}")
        );
    }
}

#[test]
fn test_help_and_version() {
    cargo_bin_cmd!("pmig")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--checksum-file"));
    cargo_bin_cmd!("pmig")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pmig"));
}
