#![expect(dead_code, reason = "Test harness helpers are used selectively.")]

//! A real daemon on an ephemeral port plus a scripted browser agent.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use futures_util::SinkExt;
use futures_util::StreamExt;
use human_browser::DaemonConfig;
use human_browser::DaemonHandle;
use human_browser::serve;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

pub const TEST_TOKEN: &str = "test-token-0123456789abcdef";
pub const TEST_TAB: u64 = 7;

pub struct TestDaemon {
    pub handle: DaemonHandle,
    dir: TempDir,
    http: reqwest::Client,
}

impl TestDaemon {
    pub async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let config = DaemonConfig::from_env()
            .with_listen("127.0.0.1:0")
            .with_allow_remote(false)
            .with_token(Some(TEST_TOKEN.to_string()))
            .with_state_path(dir.path().join("daemon.json"))
            .with_diff_dir(dir.path().join("diffs"))
            .with_max_snapshots(20)
            .with_hello_timeout(Duration::from_secs(2));
        let handle = serve(config).await.unwrap();
        Self {
            handle,
            dir,
            http: reqwest::Client::new(),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    pub fn bridge_url(&self) -> String {
        format!("{}?token={}", self.handle.bridge_url(), TEST_TOKEN)
    }

    /// `POST /v1/command` with the daemon token; returns HTTP status and body.
    pub async fn command(&self, body: Value) -> (u16, Value) {
        self.command_with_token(body, Some(TEST_TOKEN)).await
    }

    pub async fn command_with_token(&self, body: Value, token: Option<&str>) -> (u16, Value) {
        let mut request = self
            .http
            .post(format!("{}/v1/command", self.handle.http_url()))
            .json(&body);
        if let Some(token) = token {
            request = request.header("x-hb-token", token);
        }
        let response = request.send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    pub async fn stop(self) {
        self.handle.shutdown().await;
    }
}

pub type Responder = Arc<dyn Fn(&str, &Value) -> Result<Value, Value> + Send + Sync>;

/// Nodes every default snapshot returns: two unique controls, then two
/// buttons and two inputs that share a selector.
pub fn fixture_nodes() -> Value {
    json!([
        { "role": "button", "name": "Sign in", "selector": "#login" },
        { "role": "textbox", "name": "Email", "selector": "#email" },
        { "role": "button", "name": "Login A", "selector": ".dup-login" },
        { "role": "button", "name": "Login B", "selector": ".dup-login" },
        { "role": "textbox", "name": "Email A", "selector": ".dup-email" },
        { "role": "textbox", "name": "Email B", "selector": ".dup-email", "suffix": "required" }
    ])
}

/// Answers the agent vocabulary the way a cooperative page would.
pub fn default_responder() -> Responder {
    Arc::new(|command, payload| match command {
        "list_tabs" => Ok(json!({
            "tabs": [{ "id": TEST_TAB, "active": true, "title": "Fixture", "url": "https://fixture.test/" }]
        })),
        "select_tab" => Ok(json!({ "tab_id": payload["target"] })),
        "snapshot" => Ok(json!({ "tab_id": TEST_TAB, "nodes": fixture_nodes() })),
        "click" | "fill" if payload["selector"] == "#missing" => Err(json!({
            "code": "NO_MATCH",
            "message": "No element matches selector: #missing",
            "details": { "selector": "#missing" }
        })),
        "click" => Ok(json!({ "clicked": payload["selector"], "nth": payload["nth"] })),
        "fill" => Ok(json!({ "filled": payload["selector"], "value": payload["value"] })),
        "navigate" => Ok(json!({ "tab_id": TEST_TAB, "url": payload["url"] })),
        _ => Ok(json!({})),
    })
}

/// A browser agent speaking the bridge protocol over a real WebSocket.
pub struct FakeAgent {
    received: Arc<Mutex<Vec<Value>>>,
    task: JoinHandle<()>,
}

impl FakeAgent {
    pub async fn connect(url: &str) -> Self {
        Self::connect_with(url, default_responder()).await
    }

    pub async fn connect_with(url: &str, responder: Responder) -> Self {
        let (socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        let (mut write, mut read) = socket.split();
        let hello = json!({ "type": "HELLO", "version": "fake-agent/1.0", "retry_count": 2 });
        write.send(Message::Text(hello.to_string())).await.unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);
        let task = tokio::spawn(async move {
            while let Some(Ok(message)) = read.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let frame: Value = serde_json::from_str(&text).unwrap();
                if frame["type"] != "COMMAND" {
                    continue;
                }
                log.lock().unwrap().push(frame.clone());
                let command = frame["command"].as_str().unwrap_or_default();
                let reply = match responder(command, &frame["payload"]) {
                    Ok(result) => json!({
                        "type": "RESULT",
                        "request_id": frame["request_id"],
                        "ok": true,
                        "result": result
                    }),
                    Err(error) => json!({
                        "type": "RESULT",
                        "request_id": frame["request_id"],
                        "ok": false,
                        "error": error
                    }),
                };
                if write.send(Message::Text(reply.to_string())).await.is_err() {
                    break;
                }
            }
        });

        Self { received, task }
    }

    /// COMMAND frames received so far, in arrival order.
    pub fn commands(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    pub fn commands_named(&self, command: &str) -> Vec<Value> {
        self.commands()
            .into_iter()
            .filter(|frame| frame["command"] == command)
            .collect()
    }

    pub fn disconnect(self) {
        self.task.abort();
    }
}

/// Polls `status` until the bridge reports a live connection.
pub async fn wait_until_connected(daemon: &TestDaemon) {
    for _ in 0..100 {
        let (_, body) = daemon.command(json!({ "command": "status" })).await;
        if body["data"]["connected"] == true {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("agent never connected");
}
