//! End-to-end CLI surface checks via the compiled binary.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_all_modes() {
    let mut cmd = Command::cargo_bin("sublingo").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cards"))
        .stdout(predicate::str::contains("dubs"))
        .stdout(predicate::str::contains("enhance"))
        .stdout(predicate::str::contains("translit"))
        .stdout(predicate::str::contains("condense"))
        .stdout(predicate::str::contains("bulk"));
}

#[test]
fn config_prints_resolved_sections() {
    let mut cmd = Command::cargo_bin("sublingo").unwrap();
    cmd.arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[stt]"))
        .stdout(predicate::str::contains("[separation]"))
        .stdout(predicate::str::contains("[binaries]"));
}

#[test]
fn missing_media_exits_with_validation_code() {
    let mut cmd = Command::cargo_bin("sublingo").unwrap();
    cmd.args(["cards", "/definitely/not/here.mp4", "-t", "ja"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid input"));
}

#[test]
fn cards_without_language_or_subtitle_fails() {
    let temp = tempfile::TempDir::new().unwrap();
    let media = temp.path().join("movie.mp4");
    std::fs::write(&media, b"").unwrap();

    let mut cmd = Command::cargo_bin("sublingo").unwrap();
    cmd.args(["cards", media.to_str().unwrap()])
        .assert()
        .code(2);
}

#[test]
fn unknown_bulk_mode_is_rejected() {
    let mut cmd = Command::cargo_bin("sublingo").unwrap();
    cmd.args(["bulk", "frobnicate", "/tmp"]).assert().failure();
}
