//! Typed `args` for each client command and the payloads sent to the agent.

use serde::Deserialize;
use serde::Serialize;

use crate::domain::TabTarget;

fn default_diagnose_limit() -> usize {
    50
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UseArgs {
    #[serde(alias = "tab_id")]
    pub target: TabTarget,
}

/// Options forwarded verbatim to the agent's accessibility capture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compact: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotArgs {
    #[serde(default, alias = "tab_id", skip_serializing_if = "Option::is_none")]
    pub target: Option<TabTarget>,
    #[serde(flatten)]
    pub options: SnapshotOptions,
}

/// Payload of the agent `snapshot` command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotPayload {
    pub target: TabTarget,
    #[serde(flatten)]
    pub options: SnapshotOptions,
}

/// `click`/`fill` target: either a selector (plus `nth`) or a ref.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth: Option<i64>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Payload of the agent `click` and `fill` commands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabTarget>,
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nth: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeypressArgs {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollArgs {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigateArgs {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_until: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_page: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabTarget>,
}

/// Payload of the agent `screenshot` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScreenshotPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_page: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnoseArgs {
    #[serde(default = "default_diagnose_limit")]
    pub limit: usize,
}

impl Default for DiagnoseArgs {
    fn default() -> Self {
        Self {
            limit: default_diagnose_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSnapshotArgs {
    /// Path to a saved tree, or a snapshot id still held by the registry.
    pub baseline: String,
    #[serde(default, alias = "tab_id", skip_serializing_if = "Option::is_none")]
    pub target: Option<TabTarget>,
    #[serde(flatten)]
    pub options: SnapshotOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffScreenshotArgs {
    pub baseline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_page: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<TabTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffUrlArgs {
    pub url1: String,
    pub url2: String,
    #[serde(default)]
    pub screenshot: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_page: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_until: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(flatten)]
    pub options: SnapshotOptions,
}
