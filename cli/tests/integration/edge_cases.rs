//! Edge case integration tests for pmig CLI.
//!
//! These tests cover:
//! - Symlinks, including dangling ones
//! - Metadata preservation
//! - Special filenames and empty trees
//! - Re-running a migration over its own output

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_empty_directory_tree() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::create_dir_all(src.path().join("empty/deeper")).unwrap();

    let target = dst.path().join("out");
    cargo_bin_cmd!("pmig")
        .arg(src.path())
        .arg(&target)
        .assert()
        .success()
        .stderr(predicate::str::contains("3 dirs"));

    assert!(target.join("empty/deeper").is_dir());
}

#[test]
fn test_special_filenames() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let names = ["with space.txt", "ünïcödé.txt", "日本語.txt", ".hidden", "dash-start"];
    for name in names {
        fs::write(src.path().join(name), name).unwrap();
    }

    let target = dst.path().join("out");
    cargo_bin_cmd!("pmig")
        .arg("-q")
        .arg(src.path())
        .arg(&target)
        .assert()
        .success();

    for name in names {
        assert_eq!(fs::read_to_string(target.join(name)).unwrap(), name);
    }
}

#[test]
fn test_rerun_is_idempotent() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::create_dir_all(src.path().join("sub")).unwrap();
    fs::write(src.path().join("sub/a.txt"), "first").unwrap();

    let target = dst.path().join("out");
    cargo_bin_cmd!("pmig")
        .arg("-q")
        .arg(src.path())
        .arg(&target)
        .assert()
        .success();

    fs::write(src.path().join("sub/a.txt"), "second").unwrap();

    let output = cargo_bin_cmd!("pmig")
        .arg("-q")
        .arg(src.path())
        .arg(&target)
        .output()
        .unwrap();
    assert!(output.status.success());

    // Existing directories are reused, so no creation lines the second time.
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(!stdout.lines().any(|line| line.get(15..17) == Some("+ ")));
    assert_eq!(fs::read_to_string(target.join("sub/a.txt")).unwrap(), "second");
}

#[test]
fn test_no_temporary_files_left_behind() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    for i in 0..10 {
        fs::write(src.path().join(format!("f{i}")), vec![b'x'; 4096 * i]).unwrap();
    }

    let target = dst.path().join("out");
    cargo_bin_cmd!("pmig")
        .arg("-q")
        .arg(src.path())
        .arg(&target)
        .assert()
        .success();

    let leftovers: Vec<_> = fs::read_dir(&target)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(".parmig-"))
        .collect();
    assert!(leftovers.is_empty());
    assert_eq!(fs::read_dir(&target).unwrap().count(), 10);
}

#[cfg(unix)]
mod unix_tests {
    use super::*;
    use std::os::unix::fs::{PermissionsExt, symlink};
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_symlinks_recreated_verbatim() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("target.txt"), "target content").unwrap();
        symlink("target.txt", src.path().join("link")).unwrap();
        symlink("../nowhere", src.path().join("dangling")).unwrap();

        let target = dst.path().join("out");
        let output = cargo_bin_cmd!("pmig")
            .arg("-q")
            .arg(src.path())
            .arg(&target)
            .output()
            .unwrap();
        assert!(output.status.success());

        let link = target.join("link");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap().to_str().unwrap(), "target.txt");
        assert_eq!(
            fs::read_link(target.join("dangling")).unwrap().to_str().unwrap(),
            "../nowhere"
        );

        // Only the regular file is digested.
        let stdout = String::from_utf8(output.stdout).unwrap();
        assert_eq!(
            stdout.lines().filter(|line| line.get(15..17) == Some("= ")).count(),
            1
        );
    }

    #[test]
    fn test_permissions_and_mtime_preserved() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let file = src.path().join("script.sh");
        fs::write(&file, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o750)).unwrap();
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(mtime)
            .unwrap();

        let target = dst.path().join("out");
        cargo_bin_cmd!("pmig")
            .arg("-q")
            .arg(src.path())
            .arg(&target)
            .assert()
            .success();

        let meta = fs::metadata(target.join("script.sh")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o750);
        assert_eq!(meta.modified().unwrap(), mtime);
    }

    #[test]
    fn test_fifo_skipped_with_warning() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let fifo = src.path().join("pipe");
        let c_path = std::ffi::CString::new(fifo.to_str().unwrap()).unwrap();
        // SAFETY: c_path is a valid NUL-terminated path.
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) }, 0);
        fs::write(src.path().join("a.txt"), "a").unwrap();

        let target = dst.path().join("out");
        cargo_bin_cmd!("pmig")
            .arg(src.path())
            .arg(&target)
            .assert()
            .success()
            .stdout(predicate::str::contains("? skipping unsupported entry"))
            .stderr(predicate::str::contains("1 warning(s)"));

        assert!(!target.join("pipe").exists());
        assert!(target.join("a.txt").exists());
    }
}
