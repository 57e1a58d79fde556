//! Argument-parsing and input-validation tests that don't require a live
//! `scm-server` to be listening — mirrors the teacher's
//! `kimberlite-cli/tests/argument_parsing.rs` split between "commands that
//! work without a server" and commands that fail before ever dialing one.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn version_flag_shows_binary_version() {
    Command::cargo_bin("scm").unwrap().arg("--version").assert().success().stdout(predicate::str::contains("scm"));
}

#[test]
fn help_flag_lists_top_level_subcommands() {
    Command::cargo_bin("scm")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("node"))
        .stdout(predicate::str::contains("pipeline"))
        .stdout(predicate::str::contains("container"))
        .stdout(predicate::str::contains("safemode"));
}

#[test]
fn no_subcommand_is_an_error() {
    Command::cargo_bin("scm").unwrap().assert().failure();
}

#[test]
fn unknown_subcommand_is_rejected_by_clap() {
    Command::cargo_bin("scm").unwrap().arg("frobnicate").assert().failure();
}

#[test]
fn node_get_requires_a_node_id_argument() {
    Command::cargo_bin("scm").unwrap().args(["node", "get"]).assert().failure();
}

#[test]
fn node_get_rejects_a_non_hex_node_id_before_dialing_any_server() {
    Command::cargo_bin("scm")
        .unwrap()
        .args(["--server", "127.0.0.1:1", "node", "get", "not-hex"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid node id"));
}

#[test]
fn container_get_rejects_a_non_numeric_container_id() {
    Command::cargo_bin("scm")
        .unwrap()
        .args(["--server", "127.0.0.1:1", "container", "get", "abc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid container id"));
}

#[test]
fn container_event_rejects_an_unknown_event_name_before_dialing_any_server() {
    Command::cargo_bin("scm")
        .unwrap()
        .args(["--server", "127.0.0.1:1", "container", "event", "1", "explode"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown container event"));
}

#[test]
fn pipeline_create_rejects_an_unknown_replication_type() {
    Command::cargo_bin("scm")
        .unwrap()
        .args(["--server", "127.0.0.1:1", "pipeline", "create", "--replication", "quorum"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown replication type"));
}

#[test]
fn container_allocate_requires_pipeline_and_owner() {
    Command::cargo_bin("scm").unwrap().args(["container", "allocate"]).assert().failure();
}
