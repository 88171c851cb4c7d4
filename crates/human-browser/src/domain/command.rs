//! The closed command vocabulary and request policies.

use serde::Deserialize;
use serde::Serialize;

use crate::domain::snapshot::TabId;

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Commands the browser agent knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCommand {
    ListTabs,
    SelectTab,
    Snapshot,
    Click,
    Fill,
    Keypress,
    Scroll,
    Navigate,
    Screenshot,
    Reconnect,
    Reset,
}

impl AgentCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentCommand::ListTabs => "list_tabs",
            AgentCommand::SelectTab => "select_tab",
            AgentCommand::Snapshot => "snapshot",
            AgentCommand::Click => "click",
            AgentCommand::Fill => "fill",
            AgentCommand::Keypress => "keypress",
            AgentCommand::Scroll => "scroll",
            AgentCommand::Navigate => "navigate",
            AgentCommand::Screenshot => "screenshot",
            AgentCommand::Reconnect => "reconnect",
            AgentCommand::Reset => "reset",
        }
    }
}

impl std::fmt::Display for AgentCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a request when no agent is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    /// Wait for a connection until the request deadline.
    #[default]
    Hold,
    /// Fail immediately with `DISCONNECTED`.
    Fail,
}

impl QueueMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueMode::Hold => "hold",
            QueueMode::Fail => "fail",
        }
    }
}

impl std::str::FromStr for QueueMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hold" => Ok(QueueMode::Hold),
            "fail" => Ok(QueueMode::Fail),
            other => Err(format!("queue mode must be hold or fail, got {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveTab {
    Active,
}

/// A tab addressed either by id or as the currently active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TabTarget {
    Id(TabId),
    Active(ActiveTab),
}

impl TabTarget {
    pub const ACTIVE: TabTarget = TabTarget::Active(ActiveTab::Active);
}

impl Default for TabTarget {
    fn default() -> Self {
        TabTarget::ACTIVE
    }
}

impl std::str::FromStr for TabTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "active" {
            return Ok(TabTarget::ACTIVE);
        }
        s.parse::<TabId>()
            .map(TabTarget::Id)
            .map_err(|_| format!("tab must be numeric or active: {s}"))
    }
}
