//! Behavioural smoke tests for the CLI entrypoint.
//!
//! Each command runs in a scratch directory with the credential variables
//! removed, so no provider is ever contacted.

use std::process::{self, Stdio};
use std::thread;
use std::time::Duration;

use assert_cmd::Command;
use assert_cmd::cargo::{cargo_bin, cargo_bin_cmd};
use predicates::str::contains;
use tempfile::TempDir;

const SCRUBBED_VARS: [&str; 6] = [
    "SCW_SECRET_KEY",
    "SCW_ACCESS_KEY",
    "SCW_INSTANCE_ID",
    "WARDEN_CONFIG_PATH",
    "WARDEN_PROBE_ADDRESS",
    "WARDEN_CONSOLE_RCON_ENABLED",
];

fn isolated(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("warden");
    for var in SCRUBBED_VARS {
        cmd.env_remove(var);
    }
    cmd.env("HOME", dir.path());
    cmd.env("XDG_CONFIG_HOME", dir.path());
    cmd.env("RUST_LOG", "off");
    cmd.current_dir(dir.path());
    cmd
}

fn scratch() -> TempDir {
    TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"))
}

#[test]
fn cli_without_arguments_prints_usage() {
    let mut cmd = cargo_bin_cmd!("warden");
    cmd.assert().failure().stderr(contains("Usage"));
}

#[test]
fn help_lists_every_subcommand() {
    let mut cmd = cargo_bin_cmd!("warden");
    cmd.arg("--help");

    let output = cmd.assert().success().get_output().stdout.clone();
    let help = String::from_utf8_lossy(&output);
    for subcommand in ["start", "stop", "restart", "status", "serve"] {
        assert!(help.contains(subcommand), "missing {subcommand} in:\n{help}");
    }
}

#[test]
fn stop_without_credentials_fails_with_guidance() {
    let dir = scratch();
    let mut cmd = isolated(&dir);
    cmd.arg("stop");

    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("not configured"))
        .stderr(contains("SCW_SECRET_KEY"));
}

#[test]
fn start_without_credentials_notifies_the_requester() {
    let dir = scratch();
    let mut cmd = isolated(&dir);
    cmd.args(["start", "--channel", "ops-room"]);

    cmd.assert()
        .failure()
        .code(1)
        .stdout(contains("[ops-room] Cannot start the server"));

    let state = std::fs::read_to_string(dir.path().join("warden-state.toml"))
        .unwrap_or_else(|err| panic!("state file: {err}"));
    assert!(state.contains("requester_channel = \"ops-room\""), "{state}");
}

#[test]
fn status_json_reports_unknown_without_credentials() {
    let dir = scratch();
    let mut cmd = isolated(&dir);
    cmd.args(["status", "--json"]);

    cmd.assert()
        .success()
        .stdout(contains("\"state\": \"unknown\""))
        .stdout(contains("\"players\": null"));
}

#[test]
fn invalid_stop_channel_is_a_configuration_error() {
    let dir = scratch();
    let mut cmd = isolated(&dir);
    cmd.env("WARDEN_AUTO_SHUTDOWN_STOP_CHANNEL", "pigeon");
    cmd.arg("status");

    cmd.assert()
        .failure()
        .code(1)
        .stderr(contains("auto_shutdown_stop_channel"));
}

#[test]
fn serve_keeps_running_after_input_closes() {
    let dir = scratch();
    let mut cmd = process::Command::new(cargo_bin!("warden"));
    for var in SCRUBBED_VARS {
        cmd.env_remove(var);
    }
    let mut child = cmd
        .arg("serve")
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .env("RUST_LOG", "off")
        .current_dir(dir.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap_or_else(|err| panic!("spawn serve: {err}"));

    thread::sleep(Duration::from_millis(1500));
    let status = child
        .try_wait()
        .unwrap_or_else(|err| panic!("poll serve: {err}"));
    child.kill().ok();
    child.wait().ok();

    assert_eq!(status, None, "serve exited once stdin closed");
}
