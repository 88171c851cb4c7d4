//! Validates client commands and turns them into agent dispatches.

mod capture;
mod diff;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tokio::time::Instant;
use tracing::debug;

use crate::adapters::rpc::CommandRequest;
use crate::adapters::rpc::params::DiagnoseArgs;
use crate::adapters::rpc::params::ElementArgs;
use crate::adapters::rpc::params::KeypressArgs;
use crate::adapters::rpc::params::NavigateArgs;
use crate::adapters::rpc::params::ScrollArgs;
use crate::adapters::rpc::params::UseArgs;
use crate::common::mutex_lock_or_recover;
use crate::domain::AgentCommand;
use crate::domain::QueueMode;
use crate::domain::SnapshotRegistry;
use crate::domain::StructuredError;
use crate::usecases::elements::resolve_element;
use crate::usecases::ports::BridgeHandle;

pub use diff::DiffError;

/// Static facts about the running daemon, reported by `status`.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub artifacts_dir: PathBuf,
    pub daemon_version: String,
    pub bridge_url: Option<String>,
}

impl RouterConfig {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            daemon_version: env!("CARGO_PKG_VERSION").to_string(),
            bridge_url: None,
        }
    }

    pub fn with_bridge_url(mut self, bridge_url: impl Into<String>) -> Self {
        self.bridge_url = Some(bridge_url.into());
        self
    }
}

/// Queue mode plus one deadline shared by every dispatch of a request.
#[derive(Debug, Clone, Copy)]
struct RequestContext {
    mode: QueueMode,
    timeout: Duration,
    deadline: Instant,
}

impl RequestContext {
    fn new(mode: QueueMode, timeout: Duration) -> Self {
        Self {
            mode,
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    fn remaining(&self, command: AgentCommand) -> Result<Duration, StructuredError> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(
                StructuredError::timeout(format!("Timed out before dispatching {command}"))
                    .with_details(json!({
                        "command": command.as_str(),
                        "stage": "router",
                        "timeout_ms": self.timeout.as_millis() as u64,
                    })),
            );
        }
        Ok(remaining)
    }
}

/// Entry point for every `POST /v1/command`.
pub struct CommandRouter {
    bridge: BridgeHandle,
    registry: Arc<Mutex<SnapshotRegistry>>,
    config: RouterConfig,
}

impl CommandRouter {
    pub fn new(bridge: BridgeHandle, registry: SnapshotRegistry, config: RouterConfig) -> Self {
        Self {
            bridge,
            registry: Arc::new(Mutex::new(registry)),
            config,
        }
    }

    pub async fn route(&self, request: CommandRequest) -> Result<Value, StructuredError> {
        let command = request.command.clone();
        let outcome = self.route_inner(request).await;
        if let Err(err) = &outcome {
            debug!(command = %command, code = %err.code, message = %err.message, "Command failed");
        }
        outcome
    }

    async fn route_inner(&self, request: CommandRequest) -> Result<Value, StructuredError> {
        if request.timeout_ms == 0 {
            return Err(StructuredError::bad_request(
                "timeout_ms must be a positive number",
            ));
        }
        let ctx = RequestContext::new(
            request.queue_mode,
            Duration::from_millis(request.timeout_ms),
        );
        let name = request.command.as_str();
        let args = request.args;

        match name {
            "status" => self.status(),
            "tabs" => self.dispatch(AgentCommand::ListTabs, json!({}), &ctx).await,
            "use" => {
                let args: UseArgs = parse_args(name, args)?;
                self.dispatch(
                    AgentCommand::SelectTab,
                    json!({ "target": args.target }),
                    &ctx,
                )
                .await
            }
            "snapshot" => self.snapshot(parse_args(name, args)?, &ctx).await,
            "click" => {
                let args: ElementArgs = parse_args(name, args)?;
                let payload = resolve_element(name, args, &self.lock_registry())?;
                self.dispatch(AgentCommand::Click, to_payload(&payload)?, &ctx)
                    .await
            }
            "fill" => {
                let args: ElementArgs = parse_args(name, args)?;
                if args.value.is_none() {
                    return Err(StructuredError::bad_request("fill requires args.value"));
                }
                let payload = resolve_element(name, args, &self.lock_registry())?;
                self.dispatch(AgentCommand::Fill, to_payload(&payload)?, &ctx)
                    .await
            }
            "keypress" => {
                let args: KeypressArgs = parse_args(name, args)?;
                if args.key.is_empty() {
                    return Err(StructuredError::bad_request("keypress requires args.key"));
                }
                self.dispatch(AgentCommand::Keypress, to_payload(&args)?, &ctx)
                    .await
            }
            "scroll" => {
                let args: ScrollArgs = parse_args(name, args)?;
                if !args.x.is_finite() || !args.y.is_finite() {
                    return Err(StructuredError::bad_request(
                        "scroll requires finite args.x and args.y",
                    ));
                }
                self.dispatch(AgentCommand::Scroll, to_payload(&args)?, &ctx)
                    .await
            }
            "navigate" => {
                let args: NavigateArgs = parse_args(name, args)?;
                self.navigate(args, &ctx).await
            }
            "screenshot" => self.screenshot(parse_args(name, args)?, &ctx).await,
            "reconnect" => {
                self.dispatch(AgentCommand::Reconnect, json!({}), &ctx)
                    .await
            }
            "reset" => self.dispatch(AgentCommand::Reset, json!({}), &ctx).await,
            "diagnose" => {
                let args: DiagnoseArgs = parse_args(name, args)?;
                self.diagnose(args.limit)
            }
            "diff_snapshot" => self.diff_snapshot(parse_args(name, args)?, &ctx).await,
            "diff_screenshot" => self.diff_screenshot(parse_args(name, args)?, &ctx).await,
            "diff_url" => self.diff_url(parse_args(name, args)?, &ctx).await,
            other => Err(
                StructuredError::bad_request(format!("Unknown command: {other}"))
                    .with_details(json!({ "command": other })),
            ),
        }
    }

    async fn dispatch(
        &self,
        command: AgentCommand,
        payload: Value,
        ctx: &RequestContext,
    ) -> Result<Value, StructuredError> {
        let timeout = ctx.remaining(command)?;
        debug!(command = %command, mode = ctx.mode.as_str(), timeout_ms = timeout.as_millis() as u64, "Dispatching to agent");
        self.bridge.dispatch(command, payload, ctx.mode, timeout).await
    }

    async fn navigate(
        &self,
        args: NavigateArgs,
        ctx: &RequestContext,
    ) -> Result<Value, StructuredError> {
        if args.url.trim().is_empty() {
            return Err(StructuredError::bad_request("navigate requires args.url"));
        }
        self.dispatch(AgentCommand::Navigate, to_payload(&args)?, ctx)
            .await
    }

    fn status(&self) -> Result<Value, StructuredError> {
        let mut status = match to_payload(&self.bridge.status())? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let registry = self.lock_registry();
        status.insert("snapshots".to_string(), json!(registry.len()));
        status.insert(
            "max_snapshots".to_string(),
            json!(registry.capacity()),
        );
        status.insert(
            "daemon_version".to_string(),
            json!(self.config.daemon_version),
        );
        status.insert("bridge_url".to_string(), json!(self.config.bridge_url));
        Ok(Value::Object(status))
    }

    fn diagnose(&self, limit: usize) -> Result<Value, StructuredError> {
        Ok(json!({
            "status": self.status()?,
            "events": self.bridge.recent_events(limit),
        }))
    }

    fn lock_registry(&self) -> MutexGuard<'_, SnapshotRegistry> {
        mutex_lock_or_recover(&self.registry, "snapshot_registry")
    }

    fn artifact_path(&self, prefix: &str) -> PathBuf {
        self.config
            .artifacts_dir
            .join(format!("{prefix}-{}.png", Utc::now().timestamp_millis()))
    }
}

fn parse_args<T: DeserializeOwned>(command: &str, args: Value) -> Result<T, StructuredError> {
    let args = if args.is_null() {
        Value::Object(Map::new())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|err| {
        StructuredError::bad_request(format!("Invalid args for {command}: {err}"))
            .with_details(json!({ "command": command }))
    })
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, StructuredError> {
    serde_json::to_value(value).map_err(|err| {
        StructuredError::internal(format!("Failed to encode agent payload: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use image::ImageFormat;
    use image::Rgba;
    use image::RgbaImage;

    use super::*;
    use crate::domain::TabTarget;
    use crate::usecases::ports::BridgeStatus;
    use crate::usecases::ports::test_support::MockBridge;

    fn login_nodes() -> Value {
        json!([
            {"role": "button", "name": "Login", "selector": "#login"},
            {"role": "textbox", "name": "Email", "selector": "#email"},
            {"role": "button", "name": "Login", "selector": ".dup-login"},
            {"role": "button", "name": "Login", "selector": ".dup-login"}
        ])
    }

    fn router_with(mock: MockBridge, artifacts: &std::path::Path) -> (CommandRouter, Arc<MockBridge>) {
        let mock = Arc::new(mock);
        let router = CommandRouter::new(
            mock.clone(),
            SnapshotRegistry::default(),
            RouterConfig::new(artifacts),
        );
        (router, mock)
    }

    fn agent() -> MockBridge {
        MockBridge::new(|command, _payload| match command {
            AgentCommand::Snapshot => Ok(json!({"tab_id": 7, "nodes": login_nodes()})),
            _ => Ok(json!({"ok": true})),
        })
    }

    fn png(color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(4, 4, Rgba(color));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_unknown_command_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (router, mock) = router_with(agent(), dir.path());
        let err = router
            .route(CommandRequest::new("teleport", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.code.as_str(), "BAD_REQUEST");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_zero_timeout_is_rejected_before_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let (router, mock) = router_with(agent(), dir.path());
        let err = router
            .route(CommandRequest::new("tabs", json!({})).with_timeout_ms(0))
            .await
            .unwrap_err();
        assert_eq!(err.code.as_str(), "BAD_REQUEST");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_records_and_renders_refs() {
        let dir = tempfile::tempdir().unwrap();
        let (router, mock) = router_with(agent(), dir.path());
        let data = router
            .route(CommandRequest::new("snapshot", json!({"interactive": true})))
            .await
            .unwrap();

        assert_eq!(data["tab_id"], 7);
        assert!(data["snapshot_id"].as_str().unwrap().starts_with("s1-"));
        assert!(data["tree"].as_str().unwrap().contains("[ref=e1]"));
        assert_eq!(data["nodes"][3]["ref"], "e4");
        assert_eq!(data["nodes"][3]["nth"], 1);

        let call = &mock.calls_for(AgentCommand::Snapshot)[0];
        assert_eq!(call.payload, json!({"target": "active", "interactive": true}));
        assert_eq!(call.mode, QueueMode::Hold);
    }

    #[tokio::test]
    async fn test_click_by_ref_dispatches_resolved_selector() {
        let dir = tempfile::tempdir().unwrap();
        let (router, mock) = router_with(agent(), dir.path());
        let snapshot = router
            .route(CommandRequest::new("snapshot", json!({})))
            .await
            .unwrap();
        let snapshot_id = snapshot["snapshot_id"].as_str().unwrap();

        router
            .route(CommandRequest::new(
                "click",
                json!({"ref": "@e4", "snapshot_id": snapshot_id}),
            ))
            .await
            .unwrap();

        let call = &mock.calls_for(AgentCommand::Click)[0];
        assert_eq!(
            call.payload,
            json!({"tab_id": 7, "selector": ".dup-login", "nth": 1})
        );
    }

    #[tokio::test]
    async fn test_ref_without_snapshot_id_never_dispatches() {
        let dir = tempfile::tempdir().unwrap();
        let (router, mock) = router_with(agent(), dir.path());
        let err = router
            .route(CommandRequest::new("fill", json!({"ref": "e2", "value": "x"})))
            .await
            .unwrap_err();
        assert_eq!(err.code.as_str(), "BAD_REQUEST");
        assert!(err.message.contains("requires args.snapshot_id"));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fill_requires_value() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = router_with(agent(), dir.path());
        let err = router
            .route(CommandRequest::new("fill", json!({"selector": "#email"})))
            .await
            .unwrap_err();
        assert_eq!(err.message, "fill requires args.value");
    }

    #[tokio::test]
    async fn test_agent_error_passes_through_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockBridge::new(|_, _| {
            Err(StructuredError::new(
                "NO_MATCH".parse().unwrap(),
                "No element matches .missing",
            )
            .with_details(json!({"selector": ".missing"})))
        });
        let (router, _) = router_with(mock, dir.path());
        let err = router
            .route(CommandRequest::new("click", json!({"selector": ".missing", "nth": 3})))
            .await
            .unwrap_err();
        assert_eq!(err.code.as_str(), "NO_MATCH");
        assert_eq!(err.message, "No element matches .missing");
        assert_eq!(err.details.unwrap()["selector"], ".missing");
    }

    #[tokio::test]
    async fn test_queue_mode_and_timeout_reach_the_bridge() {
        let dir = tempfile::tempdir().unwrap();
        let (router, mock) = router_with(agent(), dir.path());
        router
            .route(
                CommandRequest::new("use", json!({"target": 12}))
                    .with_queue_mode(QueueMode::Fail)
                    .with_timeout_ms(2_500),
            )
            .await
            .unwrap();
        let call = &mock.calls_for(AgentCommand::SelectTab)[0];
        assert_eq!(call.payload, json!({"target": 12}));
        assert_eq!(call.mode, QueueMode::Fail);
        assert!(call.timeout <= Duration::from_millis(2_500));
        assert!(call.timeout > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_status_is_local() {
        let dir = tempfile::tempdir().unwrap();
        let status = BridgeStatus {
            connected: true,
            retry_count: 3,
            ..Default::default()
        };
        let (router, mock) = router_with(agent().with_status(status), dir.path());
        router
            .route(CommandRequest::new("snapshot", json!({})))
            .await
            .unwrap();
        let data = router
            .route(CommandRequest::new("status", json!({})))
            .await
            .unwrap();
        assert_eq!(data["connected"], true);
        assert_eq!(data["retry_count"], 3);
        assert_eq!(data["snapshots"], 1);
        assert_eq!(data["daemon_version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_diff_snapshot_against_recorded_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let captures = Arc::new(AtomicUsize::new(0));
        let counter = captures.clone();
        let mock = MockBridge::new(move |command, _| match command {
            AgentCommand::Snapshot => {
                let mut nodes = vec![json!({"role": "button", "name": "Login", "selector": "#login"})];
                if counter.fetch_add(1, Ordering::SeqCst) > 0 {
                    nodes.push(json!({"role": "link", "name": "Help", "selector": "#help"}));
                }
                Ok(json!({"tab_id": 1, "nodes": nodes}))
            }
            _ => Ok(json!({})),
        });
        let (router, _) = router_with(mock, dir.path());
        let first = router
            .route(CommandRequest::new("snapshot", json!({})))
            .await
            .unwrap();

        let data = router
            .route(CommandRequest::new(
                "diff_snapshot",
                json!({"baseline": first["snapshot_id"]}),
            ))
            .await
            .unwrap();
        assert_eq!(data["changed"], true);
        assert_eq!(data["additions"], 1);
        assert_eq!(data["removals"], 0);
        assert!(data["diff"].as_str().unwrap().contains("+ - link \"Help\" [ref=e2]"));
        assert_ne!(data["snapshot_id"], first["snapshot_id"]);
    }

    #[tokio::test]
    async fn test_diff_snapshot_against_file_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = router_with(agent(), dir.path());
        let current = router
            .route(CommandRequest::new("snapshot", json!({})))
            .await
            .unwrap();
        let baseline = dir.path().join("baseline.txt");
        std::fs::write(&baseline, format!("{}\n", current["tree"].as_str().unwrap())).unwrap();

        let data = router
            .route(CommandRequest::new(
                "diff_snapshot",
                json!({"baseline": baseline}),
            ))
            .await
            .unwrap();
        assert_eq!(data["changed"], false);
        assert_eq!(data["unchanged"], 4);
    }

    #[tokio::test]
    async fn test_diff_snapshot_missing_baseline_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (router, mock) = router_with(agent(), dir.path());
        let err = router
            .route(CommandRequest::new(
                "diff_snapshot",
                json!({"baseline": dir.path().join("nope.txt")}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code.as_str(), "NOT_FOUND");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_screenshot_saves_png() {
        let dir = tempfile::tempdir().unwrap();
        let shot = png([1, 2, 3, 255]);
        let encoded = STANDARD.encode(&shot);
        let mock = MockBridge::new(move |_, _| {
            Ok(json!({"tab_id": 4, "format": "png", "data": encoded}))
        });
        let (router, _) = router_with(mock, dir.path());
        let path = dir.path().join("nested").join("shot.png");
        let data = router
            .route(CommandRequest::new("screenshot", json!({"path": path})))
            .await
            .unwrap();
        assert_eq!(data["tab_id"], 4);
        assert_eq!(data["bytes"], shot.len());
        assert_eq!(std::fs::read(&path).unwrap(), shot);
    }

    #[tokio::test]
    async fn test_diff_screenshot_identical_images_match() {
        let dir = tempfile::tempdir().unwrap();
        let shot = png([40, 80, 120, 255]);
        let baseline = dir.path().join("baseline.png");
        std::fs::write(&baseline, &shot).unwrap();
        let encoded = STANDARD.encode(&shot);
        let mock = MockBridge::new(move |_, _| Ok(json!({"tab_id": 2, "data": encoded})));
        let (router, _) = router_with(mock, dir.path());

        let data = router
            .route(CommandRequest::new(
                "diff_screenshot",
                json!({"baseline": baseline}),
            ))
            .await
            .unwrap();
        assert_eq!(data["match"], true);
        assert_eq!(data["mismatch_percentage"], 0.0);
        assert_eq!(data["total_pixels"], 16);
        let diff_path = data["diff_path"].as_str().unwrap();
        assert!(diff_path.starts_with(dir.path().to_str().unwrap()));
        assert!(std::path::Path::new(diff_path).exists());
    }

    #[tokio::test]
    async fn test_diff_screenshot_rejects_bad_threshold_before_capture() {
        let dir = tempfile::tempdir().unwrap();
        let (router, mock) = router_with(agent(), dir.path());
        let err = router
            .route(CommandRequest::new(
                "diff_screenshot",
                json!({"baseline": "whatever.png", "threshold": 2.0}),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code.as_str(), "BAD_REQUEST");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_diff_url_navigates_then_captures_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (router, mock) = router_with(agent(), dir.path());
        let data = router
            .route(CommandRequest::new(
                "diff_url",
                json!({"url1": "https://a.example", "url2": "https://b.example", "wait_until": "load"}),
            ))
            .await
            .unwrap();

        let order: Vec<AgentCommand> = mock.calls().iter().map(|call| call.command).collect();
        assert_eq!(
            order,
            vec![
                AgentCommand::Navigate,
                AgentCommand::Snapshot,
                AgentCommand::Navigate,
                AgentCommand::Snapshot
            ]
        );
        assert_eq!(
            mock.calls()[0].payload,
            json!({"url": "https://a.example", "wait_until": "load"})
        );
        assert_eq!(data["snapshot"]["changed"], false);
        assert!(data["screenshot"].is_null());
    }

    #[tokio::test]
    async fn test_click_with_selector_and_explicit_tab() {
        let dir = tempfile::tempdir().unwrap();
        let (router, mock) = router_with(agent(), dir.path());
        router
            .route(CommandRequest::new(
                "click",
                json!({"selector": ".dup-login", "nth": -1, "tab_id": "active"}),
            ))
            .await
            .unwrap();
        let call = &mock.calls_for(AgentCommand::Click)[0];
        assert_eq!(call.payload["nth"], -1);
        assert_eq!(
            serde_json::from_value::<TabTarget>(call.payload["tab_id"].clone()).unwrap(),
            TabTarget::ACTIVE
        );
    }
}
