//! Daemon configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::domain::snapshot::DEFAULT_MAX_SNAPSHOTS;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:18765";
const DEFAULT_MAX_EVENTS: usize = 500;
const DEFAULT_HELLO_TIMEOUT_MS: u64 = 10_000;

pub const LISTEN_ENV: &str = "HUMAN_BROWSER_LISTEN";
pub const ALLOW_REMOTE_ENV: &str = "HUMAN_BROWSER_ALLOW_REMOTE";
pub const TOKEN_ENV: &str = "HUMAN_BROWSER_TOKEN";
pub const STATE_ENV: &str = "HUMAN_BROWSER_STATE";
const MAX_SNAPSHOTS_ENV: &str = "HUMAN_BROWSER_MAX_SNAPSHOTS";
const MAX_EVENTS_ENV: &str = "HUMAN_BROWSER_MAX_EVENTS";
const DIFF_DIR_ENV: &str = "HUMAN_BROWSER_DIFF_DIR";
const HELLO_TIMEOUT_ENV: &str = "HUMAN_BROWSER_HELLO_TIMEOUT_MS";

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    listen: String,
    allow_remote: bool,
    token: Option<String>,
    state_path: PathBuf,
    max_snapshots: usize,
    max_events: usize,
    diff_dir: PathBuf,
    hello_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DaemonConfig {
    pub fn listen(&self) -> &str {
        &self.listen
    }

    pub fn allow_remote(&self) -> bool {
        self.allow_remote
    }

    /// `None` when authentication is disabled.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn state_path(&self) -> &PathBuf {
        &self.state_path
    }

    pub fn max_snapshots(&self) -> usize {
        self.max_snapshots
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    pub fn diff_dir(&self) -> &PathBuf {
        &self.diff_dir
    }

    pub fn hello_timeout(&self) -> Duration {
        self.hello_timeout
    }

    pub fn from_env() -> Self {
        let allow_remote = env_bool(ALLOW_REMOTE_ENV).unwrap_or(false);
        let listen = non_empty_env(LISTEN_ENV)
            .or_else(|| listen_from_port(allow_remote))
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let token = match env::var(TOKEN_ENV) {
            Ok(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Err(_) => Some(generate_token()),
        };
        let state_path = state_path_from_env();
        let diff_dir = non_empty_env(DIFF_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_diff_dir);

        Self {
            listen,
            allow_remote,
            token,
            state_path,
            max_snapshots: parse_env_positive(MAX_SNAPSHOTS_ENV, DEFAULT_MAX_SNAPSHOTS as u64)
                as usize,
            max_events: parse_env_positive(MAX_EVENTS_ENV, DEFAULT_MAX_EVENTS as u64) as usize,
            diff_dir,
            hello_timeout: Duration::from_millis(parse_env_positive(
                HELLO_TIMEOUT_ENV,
                DEFAULT_HELLO_TIMEOUT_MS,
            )),
        }
    }

    pub fn with_listen(mut self, listen: impl Into<String>) -> Self {
        self.listen = listen.into();
        self
    }

    pub fn with_allow_remote(mut self, allow_remote: bool) -> Self {
        self.allow_remote = allow_remote;
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    pub fn with_max_snapshots(mut self, max: usize) -> Self {
        self.max_snapshots = max.max(1);
        self
    }

    pub fn with_max_events(mut self, max: usize) -> Self {
        self.max_events = max.max(1);
        self
    }

    pub fn with_diff_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diff_dir = dir.into();
        self
    }

    pub fn with_hello_timeout(mut self, timeout: Duration) -> Self {
        self.hello_timeout = timeout;
        self
    }
}

pub fn home_dir() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".human-browser")
}

pub fn default_state_path() -> PathBuf {
    home_dir().join("daemon.json")
}

/// `HUMAN_BROWSER_STATE`, or the default under the home directory.
pub fn state_path_from_env() -> PathBuf {
    non_empty_env(STATE_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(default_state_path)
}

fn default_diff_dir() -> PathBuf {
    home_dir().join("tmp").join("diffs")
}

fn non_empty_env(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_env_positive(key: &str, default: u64) -> u64 {
    let Some(value) = non_empty_env(key) else {
        return default;
    };
    match value.parse::<u64>() {
        Ok(0) => {
            warn!(value = %value, key, "Config value must be at least 1; using default");
            default
        }
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(value = %value, key, "Invalid numeric config; using default");
            default
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .and_then(|value| match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

fn listen_from_port(allow_remote: bool) -> Option<String> {
    let value = non_empty_env("PORT")?;
    match value.parse::<u16>() {
        Ok(port) => {
            let host = if allow_remote { "0.0.0.0" } else { "127.0.0.1" };
            Some(format!("{host}:{port}"))
        }
        Err(_) => {
            warn!(value = %value, "Invalid PORT; using default listen address");
            None
        }
    }
}

fn generate_token() -> String {
    let bytes: [u8; 16] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
