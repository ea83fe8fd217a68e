//! CLI integration tests using assert_cmd.
//!
//! Tests without database: always run (help, arg validation).
//! Tests with database: gated on TEST_DATABASE_URL environment variable.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn rota() -> Command {
    let mut cmd = Command::cargo_bin("rota").unwrap();
    cmd.env_remove("DATABASE_URL");
    cmd
}

// --- Help and arg validation (no database needed) ---

#[test]
fn help_shows_all_subcommands() {
    rota().arg("--help").assert().success().stdout(
        predicate::str::contains("serve")
            .and(predicate::str::contains("distribute"))
            .and(predicate::str::contains("migrate"))
            .and(predicate::str::contains("--database-url")),
    );
}

#[test]
fn help_serve_shows_port() {
    rota()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--port"));
}

#[test]
fn help_migrate_shows_dir() {
    rota()
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dir"));
}

#[test]
fn missing_subcommand_fails() {
    rota().assert().failure();
}

#[test]
fn unknown_subcommand_fails() {
    rota().arg("factorial").assert().failure();
}

#[test]
fn invalid_port_fails() {
    rota()
        .args(["serve", "--port", "not-a-port"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn distribute_without_database_url_fails() {
    rota()
        .arg("distribute")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DATABASE_URL is required"));
}

// --- With database ---

#[test]
fn migrate_then_distribute_prints_report() {
    if !common::has_test_db() {
        eprintln!("Skipping: TEST_DATABASE_URL not set");
        return;
    }
    let url = common::test_db_url();
    rota()
        .args(["--database-url", &url, "migrate"])
        .assert()
        .success();
    rota()
        .args(["--database-url", &url, "distribute"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"scanned\"").and(predicate::str::contains("\"escalated\"")));
}
