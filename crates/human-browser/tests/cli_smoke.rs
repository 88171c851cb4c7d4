#![expect(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

//! CLI smoke tests.

mod common;

use std::path::PathBuf;

use assert_cmd::Command;
use common::FakeAgent;
use common::TEST_TOKEN;
use common::TestDaemon;
use common::wait_until_connected;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const EXIT_USAGE: i32 = 64;
const EXIT_UNAVAILABLE: i32 = 69;

/// No daemon anywhere: an empty state directory and a closed port.
struct NoDaemonEnv {
    _dir: TempDir,
    state_path: PathBuf,
}

impl NoDaemonEnv {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let state_path = dir.path().join("daemon.json");
        Self {
            _dir: dir,
            state_path,
        }
    }

    fn cli_command(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("human-browser"));
        cmd.env("HUMAN_BROWSER_STATE", &self.state_path)
            .env_remove("HUMAN_BROWSER_URL")
            .env_remove("HUMAN_BROWSER_TOKEN")
            .env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> assert_cmd::assert::Assert {
        self.cli_command().args(args).assert()
    }
}

fn stderr_json(assert: &assert_cmd::assert::Assert) -> Value {
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    serde_json::from_str(&stderr).expect("stderr is a JSON error object")
}

#[test]
fn smoke_help_lists_commands() {
    let env = NoDaemonEnv::new();
    env.run(&["--help"])
        .success()
        .stdout(predicate::str::contains("snapshot"))
        .stdout(predicate::str::contains("diff"))
        .stdout(predicate::str::contains("--queue-mode"));
}

#[test]
fn smoke_unreachable_daemon_is_disconnected() {
    let env = NoDaemonEnv::new();
    let assert = env
        .run(&["--url", "http://127.0.0.1:9", "--timeout", "2000", "tabs"])
        .code(EXIT_UNAVAILABLE);
    let error = stderr_json(&assert);
    assert_eq!(error["ok"], false);
    assert_eq!(error["error"]["code"], "DISCONNECTED");
    assert_eq!(
        error["error"]["recovery"]["next_command"],
        "human-browser daemon"
    );
}

#[test]
fn smoke_negative_nth_below_minus_one_is_usage_error() {
    let env = NoDaemonEnv::new();
    let assert = env
        .run(&["--url", "http://127.0.0.1:9", "click", ".x", "--nth", "-2"])
        .code(EXIT_USAGE);
    assert_eq!(stderr_json(&assert)["error"]["code"], "BAD_REQUEST");
}

#[test]
fn smoke_ref_without_snapshot_is_usage_error() {
    let env = NoDaemonEnv::new();
    env.run(&["--url", "http://127.0.0.1:9", "click", "@e1"])
        .code(EXIT_USAGE)
        .stderr(predicate::str::contains("--snapshot"));
}

#[test]
fn smoke_ws_without_state_file_points_to_daemon() {
    let env = NoDaemonEnv::new();
    let assert = env.run(&["ws"]).code(EXIT_UNAVAILABLE);
    let error = stderr_json(&assert);
    assert_eq!(error["error"]["code"], "DISCONNECTED");
    assert_eq!(
        error["error"]["recovery"]["next_command"],
        "human-browser daemon"
    );
}

#[test]
fn smoke_zero_timeout_is_rejected_by_parser() {
    let env = NoDaemonEnv::new();
    env.run(&["--timeout", "0", "tabs"])
        .failure()
        .stderr(predicate::str::contains("--timeout"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn smoke_cli_against_live_daemon() {
    let daemon = TestDaemon::start().await;
    let _agent = FakeAgent::connect(&daemon.bridge_url()).await;
    wait_until_connected(&daemon).await;

    let url = daemon.handle.http_url().to_string();
    let state_dir = TempDir::new().unwrap();
    let state_path = state_dir.path().join("absent.json");
    let output = tokio::task::spawn_blocking(move || {
        let run = |args: &[&str]| {
            Command::new(assert_cmd::cargo::cargo_bin!("human-browser"))
                .env("HUMAN_BROWSER_STATE", &state_path)
                .args(["--url", url.as_str(), "--token", TEST_TOKEN, "--json"])
                .args(args)
                .assert()
                .success()
                .get_output()
                .stdout
                .clone()
        };
        let snapshot: Value = serde_json::from_slice(&run(&["snapshot"])).unwrap();
        let snapshot_id = snapshot["snapshot_id"].as_str().unwrap().to_string();
        let click: Value =
            serde_json::from_slice(&run(&["click", "@e3", "--snapshot", &snapshot_id])).unwrap();
        let text = Command::new(assert_cmd::cargo::cargo_bin!("human-browser"))
            .env("HUMAN_BROWSER_STATE", &state_path)
            .args(["--url", url.as_str(), "--token", TEST_TOKEN, "snapshot"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        (snapshot, click, String::from_utf8(text).unwrap())
    })
    .await
    .unwrap();

    let (snapshot, click, text) = output;
    assert_eq!(snapshot["tab_id"], common::TEST_TAB);
    assert_eq!(click["clicked"], ".dup-login");
    assert_eq!(click["nth"], 0);
    assert!(text.starts_with("snapshot_id="));
    assert!(text.contains("- button \"Sign in\" [ref=e1]"));

    daemon.stop().await;
}
