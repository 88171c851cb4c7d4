#![expect(clippy::print_stdout, reason = "CLI output is emitted here")]
#![expect(clippy::print_stderr, reason = "CLI output is emitted here")]

//! CLI application layer and composition root wiring.

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing::debug;

pub mod commands;
pub mod daemon;
pub mod error;
pub mod handlers;

use crate::app::commands::Cli;
use crate::app::commands::Commands;
use crate::app::commands::DiffCommand;
use crate::app::commands::OutputFormat;
use crate::app::daemon::DaemonHandle;
use crate::app::daemon::DaemonServerError;
use crate::app::daemon::run_daemon;
use crate::app::error::CliError;
use crate::app::error::exit_codes;
use crate::app::error::server_error_to_structured;
use crate::app::handlers::HandlerContext;
use crate::common::telemetry;
use crate::domain::StructuredError;
use crate::infra::config::DaemonConfig;
use crate::infra::config::state_path_from_env;
use crate::infra::http_client::ClientEndpoint;
use crate::infra::http_client::DaemonClient;
use crate::infra::http_client::HttpDaemonClient;

pub struct Application;

impl Application {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self) -> Result<i32> {
        let exit_code = match self.execute() {
            Ok(()) => exit_codes::SUCCESS,
            Err(e) => self.handle_error(e),
        };
        Ok(exit_code)
    }

    fn execute(&self) -> Result<()> {
        let cli = Cli::parse();
        let default_level = match (&cli.command, cli.verbose) {
            (_, true) => "debug",
            (Commands::Daemon { .. }, false) => "info",
            _ => "warn",
        };
        let _telemetry = telemetry::init_tracing(default_level);
        debug!(
            command = ?cli.command,
            queue_mode = cli.queue_mode.as_str(),
            timeout_ms = cli.timeout,
            "CLI command parsed"
        );

        if self.handle_standalone_commands(&cli)? {
            return Ok(());
        }

        let endpoint = ClientEndpoint::resolve(cli.url.clone(), cli.token.clone(), &state_path_from_env());
        let client = HttpDaemonClient::new(endpoint).map_err(CliError::from)?;
        let ctx = HandlerContext::new(&client, cli.output_format(), cli.queue_mode, cli.timeout);
        self.dispatch_command(&ctx, cli.command)?;
        Ok(())
    }

    fn handle_standalone_commands(&self, cli: &Cli) -> Result<bool> {
        let format = cli.output_format();
        match &cli.command {
            Commands::Daemon { listen } => {
                let mut config = DaemonConfig::from_env();
                if let Some(listen) = listen {
                    config = config.with_listen(listen.clone());
                }
                run_daemon(config, |handle| print_daemon_ready(handle, format))?;
                Ok(true)
            }
            Commands::Ws { show_token } => {
                handlers::handle_ws(&state_path_from_env(), *show_token, format)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn dispatch_command<C: DaemonClient>(
        &self,
        ctx: &HandlerContext<C>,
        command: Commands,
    ) -> Result<(), CliError> {
        match command {
            Commands::Daemon { .. } | Commands::Ws { .. } => {
                Err(StructuredError::internal("command is handled before dispatch").into())
            }
            Commands::Status => handlers::handle_status(ctx),
            Commands::Tabs => handlers::handle_tabs(ctx),
            Commands::Use { target } => handlers::handle_use(ctx, target),
            Commands::Snapshot { tab, options } => handlers::handle_snapshot(ctx, tab, options),
            Commands::Click { element } => handlers::handle_click(ctx, element),
            Commands::Fill { element, value } => handlers::handle_fill(ctx, element, value),
            Commands::Keypress { key, tab } => handlers::handle_keypress(ctx, key, tab),
            Commands::Scroll { x, y, tab } => handlers::handle_scroll(ctx, x, y, tab),
            Commands::Navigate {
                url,
                tab,
                wait_until,
            } => handlers::handle_navigate(ctx, url, tab, wait_until),
            Commands::Screenshot { capture, path } => {
                handlers::handle_screenshot(ctx, capture, path)
            }
            Commands::Reconnect => handlers::handle_reconnect(ctx),
            Commands::Reset => handlers::handle_reset(ctx),
            Commands::Diagnose { limit } => handlers::handle_diagnose(ctx, limit),
            Commands::Diff(DiffCommand::Snapshot {
                baseline,
                tab,
                options,
            }) => handlers::handle_diff_snapshot(ctx, baseline, tab, options),
            Commands::Diff(DiffCommand::Screenshot {
                baseline,
                capture,
                image,
            }) => handlers::handle_diff_screenshot(ctx, baseline, capture, image),
            Commands::Diff(DiffCommand::Url {
                url1,
                url2,
                screenshot,
                full_page,
                wait_until,
                options,
                image,
            }) => handlers::handle_diff_url(
                ctx, url1, url2, screenshot, full_page, wait_until, options, image,
            ),
        }
    }

    fn handle_error(&self, e: anyhow::Error) -> i32 {
        let cli_error = to_cli_error(&e);
        eprintln!("{}", cli_error.to_json_string());
        cli_error.exit_code
    }
}

fn find_error<T: std::error::Error + 'static>(error: &anyhow::Error) -> Option<&T> {
    error.chain().find_map(|source| source.downcast_ref::<T>())
}

fn to_cli_error(error: &anyhow::Error) -> CliError {
    if let Some(cli_error) = find_error::<CliError>(error) {
        return CliError {
            error: cli_error.error.clone(),
            exit_code: cli_error.exit_code,
        };
    }
    if let Some(structured) = find_error::<StructuredError>(error) {
        return CliError::new(structured.clone());
    }
    if let Some(server_error) = find_error::<DaemonServerError>(error) {
        return CliError::new(server_error_to_structured(server_error));
    }
    CliError {
        error: StructuredError::internal(format!("{error:#}")),
        exit_code: exit_codes::GENERAL_ERROR,
    }
}

fn print_daemon_ready(handle: &DaemonHandle, format: OutputFormat) {
    let state = handle.state_file();
    match format {
        OutputFormat::Json => {
            let ready = json!({
                "pid": state.pid,
                "http_url": state.http_url,
                "bridge_url": state.bridge_url,
                "auth": state.token.is_some(),
            });
            println!("{ready}");
        }
        OutputFormat::Text => {
            println!("human-browser daemon listening");
            println!("  http_url: {}", state.http_url);
            println!("  bridge_url: {}", state.bridge_url);
            if state.token.is_some() {
                println!("  token: [hidden] (human-browser ws --show-token)");
            }
        }
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}
