//! Snapshot registry: per-snapshot refs and their resolution back to selectors.

use std::collections::HashMap;
use std::collections::VecDeque;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::domain::error::StructuredError;

pub const DEFAULT_MAX_SNAPSHOTS: usize = 20;

pub type TabId = i64;

const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "checkbox",
    "combobox",
    "link",
    "listbox",
    "menuitem",
    "option",
    "radio",
    "searchbox",
    "slider",
    "spinbutton",
    "switch",
    "tab",
    "textbox",
];

/// A node exactly as reported by the browser agent, in traversal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedNode {
    pub role: String,
    #[serde(default)]
    pub name: String,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotNode {
    #[serde(rename = "ref")]
    pub reference: String,
    pub role: String,
    pub name: String,
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// Ordinal among nodes of this snapshot that share `selector`.
    pub nth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    pub total: usize,
    pub interactive: usize,
    pub lines: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub tab_id: TabId,
    pub captured_at: DateTime<Utc>,
    pub nodes: Vec<SnapshotNode>,
    pub tree: String,
    pub stats: SnapshotStats,
}

/// Where a `(ref, snapshot_id)` pair points at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRef {
    pub selector: String,
    pub nth: usize,
    pub tab_id: TabId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Unknown snapshot_id: {snapshot_id}")]
    UnknownSnapshot { snapshot_id: String },
    #[error("Unknown ref {reference} in snapshot {snapshot_id}")]
    UnknownRef {
        reference: String,
        snapshot_id: String,
    },
}

impl From<RegistryError> for StructuredError {
    fn from(err: RegistryError) -> Self {
        let details = match &err {
            RegistryError::UnknownSnapshot { snapshot_id } => json!({ "snapshot_id": snapshot_id }),
            RegistryError::UnknownRef {
                reference,
                snapshot_id,
            } => json!({ "ref": reference, "snapshot_id": snapshot_id }),
        };
        StructuredError::not_found(err.to_string())
            .with_details(details)
            .with_recovery(json!({ "next_command": "human-browser snapshot" }))
    }
}

/// Bounded store of captured snapshots, oldest first.
#[derive(Debug)]
pub struct SnapshotRegistry {
    capacity: usize,
    sequence: u64,
    snapshots: VecDeque<Snapshot>,
}

impl Default for SnapshotRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SNAPSHOTS)
    }
}

impl SnapshotRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sequence: 0,
            snapshots: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stores a capture and assigns refs `e1..eN` in the order supplied.
    pub fn record(&mut self, tab_id: TabId, captured: Vec<CapturedNode>) -> &Snapshot {
        self.sequence += 1;
        let snapshot_id = format!("s{}-{}", self.sequence, short_uuid());

        let mut seen: HashMap<String, usize> = HashMap::new();
        let nodes: Vec<SnapshotNode> = captured
            .into_iter()
            .enumerate()
            .map(|(index, node)| {
                let ordinal = seen.entry(node.selector.clone()).or_insert(0);
                let nth = *ordinal;
                *ordinal += 1;
                SnapshotNode {
                    reference: format!("e{}", index + 1),
                    role: node.role,
                    name: node.name,
                    selector: node.selector,
                    suffix: node.suffix,
                    nth,
                }
            })
            .collect();

        let (tree, stats) = format_snapshot(&nodes);
        self.snapshots.push_back(Snapshot {
            snapshot_id,
            tab_id,
            captured_at: Utc::now(),
            nodes,
            tree,
            stats,
        });
        self.evict();

        let newest = self.snapshots.len() - 1;
        &self.snapshots[newest]
    }

    pub fn get(&self, snapshot_id: &str) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .find(|snapshot| snapshot.snapshot_id == snapshot_id)
    }

    pub fn latest_for_tab(&self, tab_id: TabId) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .rev()
            .find(|snapshot| snapshot.tab_id == tab_id)
    }

    pub fn resolve(&self, snapshot_id: &str, reference: &str) -> Result<ResolvedRef, RegistryError> {
        let snapshot = self
            .get(snapshot_id)
            .ok_or_else(|| RegistryError::UnknownSnapshot {
                snapshot_id: snapshot_id.to_string(),
            })?;
        let node = snapshot
            .nodes
            .iter()
            .find(|node| node.reference == reference)
            .ok_or_else(|| RegistryError::UnknownRef {
                reference: reference.to_string(),
                snapshot_id: snapshot_id.to_string(),
            })?;
        Ok(ResolvedRef {
            selector: node.selector.clone(),
            nth: node.nth,
            tab_id: snapshot.tab_id,
        })
    }

    /// Drops the oldest snapshots over capacity, never the newest of a tab.
    fn evict(&mut self) {
        while self.snapshots.len() > self.capacity {
            let candidate = self.snapshots.iter().enumerate().position(|(index, snapshot)| {
                self.snapshots
                    .iter()
                    .skip(index + 1)
                    .any(|newer| newer.tab_id == snapshot.tab_id)
            });
            match candidate {
                Some(index) => {
                    self.snapshots.remove(index);
                }
                None => break,
            }
        }
    }
}

fn short_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn is_interactive(role: &str) -> bool {
    INTERACTIVE_ROLES.contains(&role)
}

/// Renders one line per node: `- role "name" [ref=eN] suffix`.
pub fn format_snapshot(nodes: &[SnapshotNode]) -> (String, SnapshotStats) {
    let mut lines = Vec::with_capacity(nodes.len());
    let mut interactive = 0usize;

    for node in nodes {
        if is_interactive(&node.role) {
            interactive += 1;
        }

        let name = node.name.trim();
        let mut line = if name.is_empty() {
            format!("- {}", node.role)
        } else {
            let escaped = name
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace(['\n', '\r'], " ");
            format!("- {} \"{}\"", node.role, escaped)
        };
        line.push_str(&format!(" [ref={}]", node.reference));
        if let Some(suffix) = node.suffix.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            line.push(' ');
            line.push_str(suffix);
        }
        lines.push(line);
    }

    let stats = SnapshotStats {
        total: nodes.len(),
        interactive,
        lines: lines.len(),
    };
    (lines.join("\n"), stats)
}
