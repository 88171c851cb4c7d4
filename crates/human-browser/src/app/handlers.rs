#![expect(clippy::print_stdout, reason = "CLI output is emitted here")]

use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::adapters::rpc::CommandRequest;
use crate::adapters::rpc::params::DiagnoseArgs;
use crate::adapters::rpc::params::DiffScreenshotArgs;
use crate::adapters::rpc::params::DiffSnapshotArgs;
use crate::adapters::rpc::params::DiffUrlArgs;
use crate::adapters::rpc::params::ElementArgs;
use crate::adapters::rpc::params::KeypressArgs;
use crate::adapters::rpc::params::NavigateArgs;
use crate::adapters::rpc::params::ScreenshotArgs;
use crate::adapters::rpc::params::ScrollArgs;
use crate::adapters::rpc::params::SnapshotArgs;
use crate::adapters::rpc::params::SnapshotOptions;
use crate::adapters::rpc::params::UseArgs;
use crate::app::commands::ElementTarget;
use crate::app::commands::ImageDiffFlags;
use crate::app::commands::OutputFormat;
use crate::app::commands::ScreenshotFlags;
use crate::app::commands::SnapshotFlags;
use crate::app::error::CliError;
use crate::domain::QueueMode;
use crate::domain::StructuredError;
use crate::domain::TabTarget;
use crate::infra::http_client::DaemonClient;
use crate::infra::state_file::read_state_file;
use crate::usecases::elements::normalize_ref;
use crate::usecases::elements::validate_nth;

pub type HandlerResult = Result<(), CliError>;

pub struct HandlerContext<'a, C: DaemonClient> {
    pub client: &'a C,
    pub format: OutputFormat,
    pub queue_mode: QueueMode,
    pub timeout_ms: u64,
}

impl<'a, C: DaemonClient> HandlerContext<'a, C> {
    pub fn new(client: &'a C, format: OutputFormat, queue_mode: QueueMode, timeout_ms: u64) -> Self {
        Self {
            client,
            format,
            queue_mode,
            timeout_ms,
        }
    }

    fn call<P: Serialize>(&self, command: &str, args: P) -> Result<Value, CliError> {
        let args = serde_json::to_value(args).map_err(|err| {
            StructuredError::internal(format!("Failed to encode {command} args: {err}"))
        })?;
        let request = CommandRequest::new(command, args)
            .with_queue_mode(self.queue_mode)
            .with_timeout_ms(self.timeout_ms);
        self.client.send(&request).map_err(CliError::from)
    }

    fn run<P: Serialize>(&self, command: &str, args: P) -> HandlerResult {
        let data = self.call(command, args)?;
        println!("{}", render(self.format, command, &data));
        Ok(())
    }
}

/// How a command result is printed: raw JSON with `--json`, otherwise a
/// snapshot header plus tree, a diff summary, or the JSON payload.
pub fn render(format: OutputFormat, command: &str, data: &Value) -> String {
    if format == OutputFormat::Json {
        return pretty(data);
    }
    match command {
        "snapshot" => format!(
            "snapshot_id={} tab_id={}\n{}",
            field(data, "snapshot_id"),
            field(data, "tab_id"),
            field(data, "tree")
        ),
        "diff_snapshot" => format!(
            "changed={} additions={} removals={} unchanged={}\n{}",
            field(data, "changed"),
            field(data, "additions"),
            field(data, "removals"),
            field(data, "unchanged"),
            field(data, "diff")
        ),
        "status" | "diagnose" | "diff_screenshot" | "diff_url" => pretty(data),
        _ => data.to_string(),
    }
}

fn pretty(data: &Value) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
}

fn field(data: &Value, key: &str) -> String {
    match data.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}

impl From<SnapshotFlags> for SnapshotOptions {
    fn from(flags: SnapshotFlags) -> Self {
        Self {
            interactive: flags.interactive.then_some(true),
            cursor: flags.cursor.then_some(true),
            compact: flags.compact.then_some(true),
            depth: flags.depth,
            selector: flags.selector,
        }
    }
}

/// Builds `click`/`fill` args; a ref must come with the snapshot it was read from.
pub fn element_args(
    command: &str,
    element: ElementTarget,
    value: Option<String>,
) -> Result<ElementArgs, CliError> {
    validate_nth(element.nth)?;
    let (selector, reference, snapshot_id) = match normalize_ref(&element.target) {
        Some(reference) => {
            let Some(snapshot_id) = element.snapshot else {
                return Err(StructuredError::bad_request(format!(
                    "{command} with ref requires --snapshot <snapshot_id>"
                ))
                .with_recovery(json!({ "next_command": "human-browser snapshot" }))
                .into());
            };
            (None, Some(reference.to_string()), Some(snapshot_id))
        }
        None => (Some(element.target), None, None),
    };
    Ok(ElementArgs {
        selector,
        nth: element.nth,
        reference,
        snapshot_id,
        tab_id: element.tab,
        value,
    })
}

/// The daemon resolves paths against its own working directory.
fn absolute(path: &Path) -> Result<String, CliError> {
    std::path::absolute(path)
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(|err| {
            CliError::usage(format!("Invalid path {}: {err}", path.display()))
        })
}

fn absolute_opt(path: Option<PathBuf>) -> Result<Option<String>, CliError> {
    path.as_deref().map(absolute).transpose()
}

pub fn handle_status<C: DaemonClient>(ctx: &HandlerContext<C>) -> HandlerResult {
    ctx.run("status", json!({}))
}

pub fn handle_tabs<C: DaemonClient>(ctx: &HandlerContext<C>) -> HandlerResult {
    ctx.run("tabs", json!({}))
}

pub fn handle_use<C: DaemonClient>(ctx: &HandlerContext<C>, target: TabTarget) -> HandlerResult {
    ctx.run("use", UseArgs { target })
}

pub fn handle_snapshot<C: DaemonClient>(
    ctx: &HandlerContext<C>,
    tab: Option<TabTarget>,
    flags: SnapshotFlags,
) -> HandlerResult {
    ctx.run(
        "snapshot",
        SnapshotArgs {
            target: tab,
            options: flags.into(),
        },
    )
}

pub fn handle_click<C: DaemonClient>(ctx: &HandlerContext<C>, element: ElementTarget) -> HandlerResult {
    let args = element_args("click", element, None)?;
    ctx.run("click", args)
}

pub fn handle_fill<C: DaemonClient>(
    ctx: &HandlerContext<C>,
    element: ElementTarget,
    value: String,
) -> HandlerResult {
    let args = element_args("fill", element, Some(value))?;
    ctx.run("fill", args)
}

pub fn handle_keypress<C: DaemonClient>(
    ctx: &HandlerContext<C>,
    key: String,
    tab: Option<TabTarget>,
) -> HandlerResult {
    ctx.run("keypress", KeypressArgs { key, tab_id: tab })
}

pub fn handle_scroll<C: DaemonClient>(
    ctx: &HandlerContext<C>,
    x: f64,
    y: f64,
    tab: Option<TabTarget>,
) -> HandlerResult {
    if !x.is_finite() || !y.is_finite() {
        return Err(CliError::usage("scroll values must be numeric"));
    }
    ctx.run("scroll", ScrollArgs { x, y, tab_id: tab })
}

pub fn handle_navigate<C: DaemonClient>(
    ctx: &HandlerContext<C>,
    url: String,
    tab: Option<TabTarget>,
    wait_until: Option<String>,
) -> HandlerResult {
    ctx.run(
        "navigate",
        NavigateArgs {
            url,
            tab_id: tab,
            wait_until,
        },
    )
}

pub fn handle_screenshot<C: DaemonClient>(
    ctx: &HandlerContext<C>,
    capture: ScreenshotFlags,
    path: Option<PathBuf>,
) -> HandlerResult {
    ctx.run(
        "screenshot",
        ScreenshotArgs {
            path: absolute_opt(path)?,
            selector: capture.selector,
            full_page: capture.full_page.then_some(true),
            tab_id: capture.tab,
        },
    )
}

pub fn handle_reconnect<C: DaemonClient>(ctx: &HandlerContext<C>) -> HandlerResult {
    ctx.run("reconnect", json!({}))
}

pub fn handle_reset<C: DaemonClient>(ctx: &HandlerContext<C>) -> HandlerResult {
    ctx.run("reset", json!({}))
}

pub fn handle_diagnose<C: DaemonClient>(ctx: &HandlerContext<C>, limit: usize) -> HandlerResult {
    ctx.run("diagnose", DiagnoseArgs { limit })
}

pub fn handle_diff_snapshot<C: DaemonClient>(
    ctx: &HandlerContext<C>,
    baseline: String,
    tab: Option<TabTarget>,
    flags: SnapshotFlags,
) -> HandlerResult {
    // A snapshot id passes through untouched; a local file goes as an absolute path.
    let baseline = if Path::new(&baseline).exists() {
        absolute(Path::new(&baseline))?
    } else {
        baseline
    };
    ctx.run(
        "diff_snapshot",
        DiffSnapshotArgs {
            baseline,
            target: tab,
            options: flags.into(),
        },
    )
}

pub fn handle_diff_screenshot<C: DaemonClient>(
    ctx: &HandlerContext<C>,
    baseline: PathBuf,
    capture: ScreenshotFlags,
    image: ImageDiffFlags,
) -> HandlerResult {
    ctx.run(
        "diff_screenshot",
        DiffScreenshotArgs {
            baseline: absolute(&baseline)?,
            output: absolute_opt(image.output)?,
            threshold: image.threshold,
            selector: capture.selector,
            full_page: capture.full_page.then_some(true),
            tab_id: capture.tab,
        },
    )
}

#[expect(clippy::too_many_arguments, reason = "Mirrors the diff url flags one to one")]
pub fn handle_diff_url<C: DaemonClient>(
    ctx: &HandlerContext<C>,
    url1: String,
    url2: String,
    screenshot: bool,
    full_page: bool,
    wait_until: Option<String>,
    flags: SnapshotFlags,
    image: ImageDiffFlags,
) -> HandlerResult {
    ctx.run(
        "diff_url",
        DiffUrlArgs {
            url1,
            url2,
            screenshot,
            full_page: full_page.then_some(true),
            wait_until,
            threshold: image.threshold,
            output: absolute_opt(image.output)?,
            options: flags.into(),
        },
    )
}

/// Prints the bridge URL from the daemon state file. The token stays hidden
/// unless asked for, so the output is safe to paste into logs.
pub fn handle_ws(state_path: &Path, show_token: bool, format: OutputFormat) -> HandlerResult {
    let state = read_state_file(state_path).map_err(|err| {
        CliError::new(
            StructuredError::disconnected("Daemon state file not found; is the daemon running?")
                .with_details(json!({
                    "state_path": state_path.display().to_string(),
                    "cause": err.to_string(),
                }))
                .with_recovery(json!({ "next_command": "human-browser daemon" })),
        )
    })?;

    let token = match (&state.token, show_token) {
        (Some(token), true) => token.clone(),
        (Some(_), false) => "[hidden]".to_string(),
        (None, _) => "none".to_string(),
    };
    let data = json!({
        "ws_url": state.bridge_url,
        "token": token,
        "token_hidden": state.token.is_some() && !show_token,
        "connect_url": show_token.then(|| state.bridge_url_with_token()),
    });

    if format == OutputFormat::Json {
        println!("{}", pretty(&data));
        return Ok(());
    }
    println!("ws_url: {}", state.bridge_url);
    println!("token: {token}");
    if show_token {
        println!("connect_url: {}", state.bridge_url_with_token());
    } else if state.token.is_some() {
        println!("hint: use `human-browser ws --show-token` to print the token");
    }
    Ok(())
}
