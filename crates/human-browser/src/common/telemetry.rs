#![expect(clippy::print_stderr, reason = "Tracing not initialized yet")]

//! Telemetry and tracing setup.
//!
//! Controlled by `RUST_LOG` plus:
//! - `HUMAN_BROWSER_LOG`: append logs to this file instead of a stream
//! - `HUMAN_BROWSER_LOG_FORMAT`: `text` (default) or `json`
//! - `HUMAN_BROWSER_LOG_STREAM`: `stderr` (default) or `stdout`

use std::fs::File;
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::Path;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

const LOG_FILE_ENV: &str = "HUMAN_BROWSER_LOG";
const LOG_FORMAT_ENV: &str = "HUMAN_BROWSER_LOG_FORMAT";
const LOG_STREAM_ENV: &str = "HUMAN_BROWSER_LOG_STREAM";

/// Keeps the non-blocking file writer alive; drop it to flush.
#[derive(Debug)]
pub struct TelemetryGuard {
    _guard: Option<WorkerGuard>,
}

impl TelemetryGuard {
    fn disabled() -> Self {
        Self { _guard: None }
    }
}

pub fn init_tracing(default_level: &str) -> TelemetryGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let (writer, guard, ansi) = make_writer(log_sink_from_env());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer);
    let installed = match log_format_from_env() {
        LogFormat::Json => builder
            .json()
            .with_ansi(false)
            .with_current_span(false)
            .try_init(),
        LogFormat::Text => builder.with_target(false).with_ansi(ansi).try_init(),
    };
    if installed.is_err() {
        return TelemetryGuard::disabled();
    }
    TelemetryGuard { _guard: guard }
}

/// Where log lines go: a file from `HUMAN_BROWSER_LOG`, else a stream.
#[derive(Debug, PartialEq, Eq)]
enum LogSink {
    File(PathBuf),
    Stream(LogStream),
}

fn log_sink_from_env() -> LogSink {
    match std::env::var(LOG_FILE_ENV) {
        Ok(value) if !value.trim().is_empty() => LogSink::File(PathBuf::from(value.trim())),
        _ => LogSink::Stream(log_stream_from_env()),
    }
}

fn make_writer(sink: LogSink) -> (BoxMakeWriter, Option<WorkerGuard>, bool) {
    let path = match sink {
        LogSink::Stream(stream) => return stream_writer(stream),
        LogSink::File(path) => path,
    };
    match open_log_file(&path) {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            (BoxMakeWriter::new(non_blocking), Some(guard), false)
        }
        Err(err) => {
            eprintln!(
                "Warning: failed to open log file {}: {err}; logging to stderr",
                path.display()
            );
            stream_writer(LogStream::Stderr)
        }
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn stream_writer(stream: LogStream) -> (BoxMakeWriter, Option<WorkerGuard>, bool) {
    match stream {
        LogStream::Stdout => (
            BoxMakeWriter::new(std::io::stdout),
            None,
            std::io::stdout().is_terminal(),
        ),
        LogStream::Stderr => (
            BoxMakeWriter::new(std::io::stderr),
            None,
            std::io::stderr().is_terminal(),
        ),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogStream {
    Stderr,
    Stdout,
}

fn normalized_env(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|value| value.trim().to_lowercase())
}

fn log_format_from_env() -> LogFormat {
    match normalized_env(LOG_FORMAT_ENV).as_deref() {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Text,
    }
}

fn log_stream_from_env() -> LogStream {
    match normalized_env(LOG_STREAM_ENV).as_deref() {
        Some("stdout") => LogStream::Stdout,
        _ => LogStream::Stderr,
    }
}
