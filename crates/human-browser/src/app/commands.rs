use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueHint;
use std::path::PathBuf;

use crate::domain::QueueMode;
use crate::domain::TabTarget;
use crate::domain::command::DEFAULT_TIMEOUT_MS;

const AFTER_LONG_HELP: &str = r##"WORKFLOW:
    1. Start the daemon and connect the browser agent to its bridge URL
    2. Capture a snapshot to get element refs
    3. Click or fill by ref (with --snapshot) or by CSS selector
    4. Diff snapshots or screenshots to see what changed

REFS:
    @e1, ref=e1, e1  - Element refs from 'snapshot' output; always pass --snapshot <ID>

EXAMPLES:
    human-browser daemon
    human-browser ws --show-token
    human-browser snapshot --interactive
    human-browser click @e3 --snapshot 8f0c...
    human-browser fill "#email" me@example.com
    human-browser click .dup-login --nth 1
    human-browser diff snapshot <SNAPSHOT_ID>
    human-browser diff url https://a.example https://b.example --screenshot"##;

#[derive(Parser)]
#[command(name = "human-browser")]
#[command(author, version, propagate_version = true)]
#[command(about = "Drive a live browser tab through the human-browser daemon")]
#[command(after_long_help = AFTER_LONG_HELP)]
#[command(subcommand_required = true, arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Print raw JSON results
    #[arg(long, global = true)]
    pub json: bool,

    /// Command deadline in milliseconds
    #[arg(
        long,
        global = true,
        value_name = "MS",
        default_value_t = DEFAULT_TIMEOUT_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: u64,

    /// What to do when no agent is connected: hold until the deadline, or fail
    #[arg(long, global = true, value_name = "MODE", default_value = "hold")]
    pub queue_mode: QueueMode,

    /// Daemon HTTP URL (defaults to the running daemon's state file)
    #[arg(long, global = true, env = "HUMAN_BROWSER_URL", value_hint = ValueHint::Url)]
    pub url: Option<String>,

    #[arg(long, global = true, env = "HUMAN_BROWSER_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the daemon in the foreground
    Daemon {
        /// Override HUMAN_BROWSER_LISTEN for this run
        #[arg(long, value_name = "HOST:PORT")]
        listen: Option<String>,
    },

    /// Print the bridge URL the browser agent should connect to
    Ws {
        #[arg(long)]
        show_token: bool,
    },

    /// Bridge connection and registry status
    Status,

    /// List open tabs
    Tabs,

    /// Make a tab the active one
    Use {
        #[arg(value_name = "active|TAB_ID")]
        target: TabTarget,
    },

    /// Capture the page as a ref-annotated accessibility tree
    Snapshot {
        #[arg(long, value_name = "active|TAB_ID")]
        tab: Option<TabTarget>,

        #[command(flatten)]
        options: SnapshotFlags,
    },

    /// Click an element by selector or ref
    Click {
        #[command(flatten)]
        element: ElementTarget,
    },

    /// Fill an input by selector or ref
    Fill {
        #[command(flatten)]
        element: ElementTarget,

        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Press a key in the page
    Keypress {
        key: String,

        #[arg(long, value_name = "active|TAB_ID")]
        tab: Option<TabTarget>,
    },

    /// Scroll the page by an offset
    #[command(allow_negative_numbers = true)]
    Scroll {
        x: f64,
        y: f64,

        #[arg(long, value_name = "active|TAB_ID")]
        tab: Option<TabTarget>,
    },

    /// Load a URL in a tab
    Navigate {
        #[arg(value_hint = ValueHint::Url)]
        url: String,

        #[arg(long, value_name = "active|TAB_ID")]
        tab: Option<TabTarget>,

        /// Load state to wait for (e.g. load, domcontentloaded)
        #[arg(long, value_name = "STATE")]
        wait_until: Option<String>,
    },

    /// Save a PNG screenshot
    Screenshot {
        #[command(flatten)]
        capture: ScreenshotFlags,

        /// Output path (defaults to the daemon's diff directory)
        #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
        path: Option<PathBuf>,
    },

    /// Ask the agent to re-establish its browser session
    Reconnect,

    /// Ask the agent to reset its state
    Reset,

    /// Recent bridge events plus status
    Diagnose {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Compare snapshots, screenshots, or two URLs
    #[command(subcommand)]
    Diff(DiffCommand),
}

#[derive(Debug, Subcommand)]
pub enum DiffCommand {
    /// Diff the current tree against a snapshot id or a saved tree file
    Snapshot {
        #[arg(value_name = "SNAPSHOT_ID|FILE")]
        baseline: String,

        #[arg(long, value_name = "active|TAB_ID")]
        tab: Option<TabTarget>,

        #[command(flatten)]
        options: SnapshotFlags,
    },

    /// Diff a fresh screenshot against a baseline image
    Screenshot {
        #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
        baseline: PathBuf,

        #[command(flatten)]
        capture: ScreenshotFlags,

        #[command(flatten)]
        image: ImageDiffFlags,
    },

    /// Navigate to two URLs and diff what each renders
    Url {
        url1: String,
        url2: String,

        /// Also diff screenshots of both pages
        #[arg(long)]
        screenshot: bool,

        #[arg(long)]
        full_page: bool,

        #[arg(long, value_name = "STATE")]
        wait_until: Option<String>,

        #[command(flatten)]
        options: SnapshotFlags,

        #[command(flatten)]
        image: ImageDiffFlags,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct SnapshotFlags {
    /// Only interactive elements
    #[arg(long)]
    pub interactive: bool,

    /// Include cursor-interactive elements
    #[arg(long)]
    pub cursor: bool,

    #[arg(long)]
    pub compact: bool,

    #[arg(long, value_name = "N")]
    pub depth: Option<u32>,

    /// Scope the snapshot to a CSS selector
    #[arg(long, value_name = "CSS")]
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ElementTarget {
    /// CSS selector, or a ref (@e1, ref=e1, e1) from 'snapshot'
    #[arg(value_name = "SELECTOR|REF")]
    pub target: String,

    /// Snapshot the ref belongs to
    #[arg(long, value_name = "SNAPSHOT_ID")]
    pub snapshot: Option<String>,

    /// Which match to act on: 0-based index, or -1 for the last
    #[arg(long, allow_hyphen_values = true, value_name = "N")]
    pub nth: Option<i64>,

    #[arg(long, value_name = "active|TAB_ID")]
    pub tab: Option<TabTarget>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ScreenshotFlags {
    /// Capture only this element
    #[arg(long, value_name = "CSS")]
    pub selector: Option<String>,

    #[arg(long)]
    pub full_page: bool,

    #[arg(long, value_name = "active|TAB_ID")]
    pub tab: Option<TabTarget>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ImageDiffFlags {
    /// Per-channel tolerance in [0, 1]
    #[arg(long, value_name = "T")]
    pub threshold: Option<f64>,

    /// Where to write the diff image
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
