// SPDX-License-Identifier: MIT OR Apache-2.0
//! CLI integration tests for the `ingest` binary, driven through the real
//! process boundary via `assert_cmd`.

use assert_cmd::Command;
use predicates::prelude::*;

fn ingest() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("ingest").expect("binary `ingest` should be built")
}

#[test]
fn help_exits_zero_and_lists_subcommands() {
    ingest()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ingest pipeline test harness"))
        .stdout(predicate::str::contains("test"))
        .stdout(predicate::str::contains("direct"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn version_shows_version_string() {
    ingest()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_lists_every_test_subcommand() {
    ingest()
        .args(["test", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("integration"))
        .stdout(predicate::str::contains("capture"))
        .stdout(predicate::str::contains("forward"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("runs"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn search_with_no_matches_reports_none_found() {
    ingest()
        .args(["search", "no-such-spec-exists"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no specs matched"));
}

#[test]
fn search_matches_a_known_spec_id() {
    ingest()
        .args(["search", "SCOPE-001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("TEST-SCOPE-001"));
}

#[test]
fn run_without_backend_token_fails_with_config_missing_exit_code() {
    ingest()
        .env_remove("BACKEND_TOKEN")
        .env_remove("TEST_INPUT_CHANNEL_ID")
        .args(["test", "run"])
        .assert()
        .failure()
        .code(predicate::eq(1).or(predicate::eq(2)));
}

#[test]
fn status_with_no_runs_yet_fails_gracefully() {
    let dir = tempfile::tempdir().unwrap();
    ingest()
        .env("RUNS_ROOT", dir.path())
        .args(["test", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no runs recorded"));
}

#[test]
fn history_with_no_data_fails_gracefully() {
    let dir = tempfile::tempdir().unwrap();
    ingest()
        .env("RUNS_ROOT", dir.path())
        .args(["test", "history"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no history"));
}

#[test]
fn unknown_subcommand_fails_with_helpful_error() {
    ingest().arg("not-a-real-command").assert().failure();
}

#[test]
fn forward_unknown_test_id_reports_fixture_not_found() {
    let fixture_dir = tempfile::tempdir().unwrap();
    ingest()
        .env("BACKEND_TOKEN", "test-token")
        .env("TEST_INPUT_CHANNEL_ID", "chat-1")
        .env("FIXTURE_ROOT", fixture_dir.path())
        .args(["test", "forward", "TEST-NOPE-999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no fixture for TEST-NOPE-999"));
}
