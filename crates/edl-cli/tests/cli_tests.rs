//! CLI integration tests

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::PathBuf;

const SCREEN: &str = "4 0 1\nbeginScreenProperties\nx 0\ny 0\nw 320\nh 240\nendScreenProperties\n\
object activeXTextClass\nbeginObjectProperties\nx 10\ny 10\nw 100\nh 20\nvalue {\n  \"Hello\"\n}\n\
endObjectProperties\n\
object activeSliderClass\nbeginObjectProperties\nx 10\ny 40\nw 100\nh 20\ncontrolPv \"SLIDER:PV\"\n\
endObjectProperties\n";

fn edl2ui() -> Command {
    let mut cmd = cargo_bin_cmd!("edl2ui");
    // Keep the host's EDM setup out of the tests.
    cmd.env_remove("EDMCOLORFILE")
        .env_remove("EDMFILES")
        .env_remove("EDMDATAFILES")
        .env_remove("RUST_LOG");
    cmd
}

fn write_screen(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdir");
    }
    std::fs::write(&path, SCREEN).expect("write screen");
    path
}

#[test]
fn test_cli_help() {
    edl2ui()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("PyDM"));
}

#[test]
fn test_cli_version() {
    edl2ui()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_converts_single_file_next_to_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_screen(&dir, "panel.edl");

    edl2ui()
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote"))
        .stdout(predicate::str::contains("unsupported: activeSliderClass"))
        .stdout(predicate::str::contains("channel SLIDER:PV"));

    let ui = std::fs::read_to_string(dir.path().join("panel.ui")).expect("output written");
    assert!(ui.contains("<widget class=\"PyDMLabel\" name=\"PyDMLabel_1\">"));
    assert!(ui.contains("<string>Hello</string>"));
}

#[test]
fn test_cli_refuses_existing_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_screen(&dir, "panel.edl");
    let output = dir.path().join("panel.ui");
    std::fs::write(&output, "keep me").expect("write");

    edl2ui()
        .arg(&input)
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(std::fs::read_to_string(&output).expect("read"), "keep me");

    edl2ui().arg(&input).arg(&output).arg("--overwrite").assert().success();
    let ui = std::fs::read_to_string(&output).expect("read");
    assert!(ui.contains("<ui version=\"4.0\">"));
}

#[test]
fn test_cli_missing_input_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    edl2ui()
        .arg(dir.path().join("nope.edl"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.edl"));
}

#[test]
fn test_cli_scrollable_flag() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_screen(&dir, "panel.edl");
    let output = dir.path().join("scroll.ui");

    edl2ui()
        .arg(&input)
        .arg(&output)
        .arg("--scrollable")
        .assert()
        .success();
    let ui = std::fs::read_to_string(&output).expect("read");
    assert!(ui.contains("QScrollArea"));
}

#[test]
fn test_cli_directory_mode_mirrors_layout() {
    let input = tempfile::tempdir().expect("tempdir");
    let output = tempfile::tempdir().expect("tempdir");
    write_screen(&input, "top.edl");
    write_screen(&input, "nested/inner.edl");
    std::fs::write(input.path().join("readme.txt"), "not a screen").expect("write");

    edl2ui()
        .arg(input.path())
        .arg(output.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("converted 2 files, 0 failed"));

    assert!(output.path().join("top.ui").is_file());
    assert!(output.path().join("nested/inner.ui").is_file());
    assert!(!output.path().join("readme.ui").exists());
}

#[test]
fn test_cli_directory_mode_reports_failures() {
    let input = tempfile::tempdir().expect("tempdir");
    let output = tempfile::tempdir().expect("tempdir");
    write_screen(&input, "good.edl");
    std::fs::write(input.path().join("bad.edl"), "no screen block").expect("write");

    edl2ui()
        .arg(input.path())
        .arg(output.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("converted 1 files, 1 failed"))
        .stdout(predicate::str::contains("bad.edl"));
    assert!(output.path().join("good.ui").is_file());
}
