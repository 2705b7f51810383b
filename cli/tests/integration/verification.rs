//! Digest verification integration tests for pmig CLI.
//!
//! Covers inline verification, the deferred `--checksum-file` manifest,
//! `--replay` and sparse copies.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use tempfile::TempDir;

const SHA1_EMPTY: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";
const SHA1_HELLO: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";

fn match_lines(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| line.get(15..17) == Some("= "))
        .map(str::to_owned)
        .collect()
}

#[test]
fn test_empty_file_digest() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("empty"), "").unwrap();

    let target = dst.path().join("out");
    let output = cargo_bin_cmd!("pmig")
        .arg("-q")
        .arg(src.path())
        .arg(&target)
        .output()
        .unwrap();
    assert!(output.status.success());

    let matches = match_lines(&output.stdout);
    assert_eq!(matches.len(), 1);
    assert!(matches[0].ends_with(&format!("{SHA1_EMPTY}  {}", target.join("empty").display())));
    assert_eq!(fs::metadata(target.join("empty")).unwrap().len(), 0);
}

#[test]
fn test_every_file_gets_a_match_line() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::create_dir_all(src.path().join("a/b")).unwrap();
    fs::write(src.path().join("one"), "1").unwrap();
    fs::write(src.path().join("a/two"), "22").unwrap();
    fs::write(src.path().join("a/b/three"), "333").unwrap();
    fs::write(src.path().join("a/b/four"), "4444").unwrap();

    let output = cargo_bin_cmd!("pmig")
        .arg("-q")
        .arg(src.path())
        .arg(dst.path().join("out"))
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(match_lines(&output.stdout).len(), 4);
}

#[rstest]
#[case::sha1("sha1", SHA1_HELLO)]
#[case::sha256(
    "sha256",
    "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
)]
#[case::blake3(
    "blake3",
    "ea8f163db38682925e4491c5e58d4bb3506ef8c14eb78a86e908c5624a67200f"
)]
fn test_digest_algorithms(#[case] algorithm: &str, #[case] expected: &str) {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "hello").unwrap();

    let target = dst.path().join("out");
    let output = cargo_bin_cmd!("pmig")
        .args(["-q", "--digest", algorithm])
        .arg(src.path())
        .arg(&target)
        .output()
        .unwrap();
    assert!(output.status.success());

    let matches = match_lines(&output.stdout);
    assert_eq!(matches.len(), 1);
    assert!(matches[0].ends_with(&format!("{expected}  {}", target.join("a.txt").display())));
}

#[test]
fn test_checksum_file_manifest_format() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    fs::create_dir_all(src.path().join("sub")).unwrap();
    fs::write(src.path().join("a.txt"), "hello").unwrap();
    fs::write(src.path().join("sub/b.txt"), "hello").unwrap();

    let manifest = work.path().join("sums.sha1");
    let target = dst.path().join("out");
    let output = cargo_bin_cmd!("pmig")
        .arg("-q")
        .arg("--checksum-file")
        .arg(&manifest)
        .arg(src.path())
        .arg(&target)
        .output()
        .unwrap();
    assert!(output.status.success());

    let contents = fs::read_to_string(&manifest).unwrap();
    let mut lines: Vec<&str> = contents.lines().collect();
    lines.sort_unstable();
    let mut expected = vec![
        format!("{SHA1_HELLO}  {}", target.join("a.txt").display()),
        format!("{SHA1_HELLO}  {}", target.join("sub/b.txt").display()),
    ];
    expected.sort_unstable();
    assert_eq!(lines, expected);

    // Deferred mode records first, then checks each record after the copy phase.
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.lines().filter(|line| line.get(15..17) == Some("# ")).count(),
        2
    );
    assert_eq!(match_lines(&output.stdout).len(), 2);
}

#[test]
fn test_replay_clean_manifest() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "hello").unwrap();
    let manifest = work.path().join("sums.sha1");

    cargo_bin_cmd!("pmig")
        .arg("-q")
        .arg("--checksum-file")
        .arg(&manifest)
        .arg(src.path())
        .arg(dst.path().join("out"))
        .assert()
        .success();

    cargo_bin_cmd!("pmig")
        .arg("--replay")
        .arg(&manifest)
        .assert()
        .success()
        .stderr(predicate::str::contains("1 match, 0 mismatch"));
}

#[test]
fn test_relative_destination_replays_from_anywhere() {
    let work = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    fs::create_dir(work.path().join("src")).unwrap();
    fs::write(work.path().join("src/a.txt"), "hello").unwrap();

    cargo_bin_cmd!("pmig")
        .current_dir(work.path())
        .args(["-q", "--checksum-file", "sums.sha1", "src", "out"])
        .assert()
        .success();

    let manifest = work.path().join("sums.sha1");
    let contents = fs::read_to_string(&manifest).unwrap();
    let (digest, path) = contents.trim_end().split_once("  ").unwrap();
    assert_eq!(digest, SHA1_HELLO);
    assert!(std::path::Path::new(path).is_absolute());
    assert!(path.ends_with("out/a.txt"));

    cargo_bin_cmd!("pmig")
        .current_dir(elsewhere.path())
        .arg("--replay")
        .arg(&manifest)
        .assert()
        .success()
        .stderr(predicate::str::contains("1 match, 0 mismatch"));
}

#[test]
fn test_replay_after_corruption_reports_and_keeps_file() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), "hello").unwrap();
    fs::write(src.path().join("b.txt"), "world").unwrap();
    let manifest = work.path().join("sums.sha1");
    let target = dst.path().join("out");

    cargo_bin_cmd!("pmig")
        .arg("-q")
        .arg("--checksum-file")
        .arg(&manifest)
        .arg(src.path())
        .arg(&target)
        .assert()
        .success();

    fs::write(target.join("a.txt"), "HELLO").unwrap();

    cargo_bin_cmd!("pmig")
        .arg("--replay")
        .arg(&manifest)
        .assert()
        .code(1)
        .stdout(predicate::str::contains(format!(
            "! digest mismatch for {}",
            target.join("a.txt").display()
        )))
        .stderr(predicate::str::contains("1 match, 1 mismatch"));

    assert_eq!(fs::read_to_string(target.join("a.txt")).unwrap(), "HELLO");
    assert_eq!(fs::read_to_string(target.join("b.txt")).unwrap(), "world");
}

#[test]
fn test_replay_malformed_manifest_line() {
    let work = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(dst.path().join("a.txt"), "hello").unwrap();
    let manifest = work.path().join("sums.sha1");
    fs::write(
        &manifest,
        format!(
            "{SHA1_HELLO}  {}\nnot a record\n",
            dst.path().join("a.txt").display()
        ),
    )
    .unwrap();

    cargo_bin_cmd!("pmig")
        .arg("--replay")
        .arg(&manifest)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("1 failure(s)"));
}

#[test]
fn test_replay_missing_manifest_is_setup_error() {
    let work = TempDir::new().unwrap();

    cargo_bin_cmd!("pmig")
        .arg("--replay")
        .arg(work.path().join("absent.sha1"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error["));
}

#[cfg(unix)]
#[test]
fn test_sparse_round_trip() {
    use std::io::{Seek, SeekFrom, Write};

    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();

    let path = src.path().join("sparse.img");
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(b"head").unwrap();
    file.seek(SeekFrom::Start(4 * 1024 * 1024)).unwrap();
    file.write_all(b"tail").unwrap();
    drop(file);

    let target = dst.path().join("out");
    cargo_bin_cmd!("pmig")
        .args(["-q", "--sparse"])
        .arg(src.path())
        .arg(&target)
        .assert()
        .success();

    let original = fs::read(&path).unwrap();
    let copied = fs::read(target.join("sparse.img")).unwrap();
    assert_eq!(original.len(), copied.len());
    assert!(original == copied);
}
