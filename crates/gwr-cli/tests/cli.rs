// SPDX-License-Identifier: MIT OR Apache-2.0
//! CLI end-to-end checks: argument surface and exit-code policy.

use assert_cmd::Command;
use predicates::prelude::*;

fn gwr() -> Command {
    Command::cargo_bin("gwr").expect("binary built")
}

#[test]
fn help_lists_subcommands() {
    gwr()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("diff"))
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("dump"))
        .stdout(predicate::str::contains("ping"));
}

#[test]
fn missing_state_file_is_a_validation_error() {
    gwr()
        .args(["diff", "--state", "/nonexistent/state.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot read state file"));
}

#[test]
fn malformed_state_file_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{not json").unwrap();

    gwr()
        .args(["diff", "--state", path.to_str().unwrap()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn unknown_output_mode_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{}").unwrap();

    gwr()
        .args(["diff", "--state", path.to_str().unwrap(), "--output", "yaml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown output mode"));
}

#[test]
fn unreachable_control_plane_is_an_execution_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{}").unwrap();

    gwr()
        .args([
            "diff",
            "--state",
            path.to_str().unwrap(),
            // Reserved port on localhost; connection is refused immediately.
            "--addr",
            "http://127.0.0.1:1",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot reach control plane"));
}

#[test]
fn ping_reports_unreachable_plane() {
    gwr()
        .args(["ping", "--addr", "http://127.0.0.1:1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot reach control plane"));
}
