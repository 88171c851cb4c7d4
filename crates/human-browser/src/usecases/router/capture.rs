use std::path::Path;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;

use super::CommandRouter;
use super::RequestContext;
use super::to_payload;
use crate::adapters::rpc::params::ScreenshotArgs;
use crate::adapters::rpc::params::ScreenshotPayload;
use crate::adapters::rpc::params::SnapshotArgs;
use crate::adapters::rpc::params::SnapshotOptions;
use crate::adapters::rpc::params::SnapshotPayload;
use crate::domain::AgentCommand;
use crate::domain::CapturedNode;
use crate::domain::Snapshot;
use crate::domain::StructuredError;
use crate::domain::TabId;
use crate::domain::TabTarget;

#[derive(Debug, Deserialize)]
struct SnapshotResult {
    tab_id: TabId,
    #[serde(default)]
    nodes: Vec<CapturedNode>,
}

#[derive(Debug, Deserialize)]
struct ScreenshotResult {
    #[serde(default)]
    tab_id: Option<TabId>,
    data: String,
}

pub(super) struct Screenshot {
    pub tab_id: Option<TabId>,
    pub png: Vec<u8>,
}

impl CommandRouter {
    pub(super) async fn snapshot(
        &self,
        args: SnapshotArgs,
        ctx: &RequestContext,
    ) -> Result<Value, StructuredError> {
        let snapshot = self.capture_snapshot(args.target, args.options, ctx).await?;
        to_payload(&snapshot)
    }

    /// Captures and records a snapshot; refs are valid once this returns.
    pub(super) async fn capture_snapshot(
        &self,
        target: Option<TabTarget>,
        options: SnapshotOptions,
        ctx: &RequestContext,
    ) -> Result<Snapshot, StructuredError> {
        let payload = SnapshotPayload {
            target: target.unwrap_or_default(),
            options,
        };
        let raw = self
            .dispatch(AgentCommand::Snapshot, to_payload(&payload)?, ctx)
            .await?;
        let result: SnapshotResult = serde_json::from_value(raw).map_err(|err| {
            StructuredError::internal("Agent returned a malformed snapshot result")
                .with_details(json!({ "cause": err.to_string() }))
        })?;

        let mut registry = self.lock_registry();
        Ok(registry.record(result.tab_id, result.nodes).clone())
    }

    pub(super) async fn screenshot(
        &self,
        args: ScreenshotArgs,
        ctx: &RequestContext,
    ) -> Result<Value, StructuredError> {
        let shot = self
            .capture_screenshot(
                ScreenshotPayload {
                    tab_id: args.tab_id,
                    selector: args.selector,
                    full_page: args.full_page,
                },
                ctx,
            )
            .await?;

        let path = args
            .path
            .map(PathBuf::from)
            .unwrap_or_else(|| self.artifact_path("screenshot"));
        write_artifact(&path, &shot.png).await?;

        Ok(json!({
            "path": path,
            "tab_id": shot.tab_id,
            "bytes": shot.png.len(),
        }))
    }

    pub(super) async fn capture_screenshot(
        &self,
        payload: ScreenshotPayload,
        ctx: &RequestContext,
    ) -> Result<Screenshot, StructuredError> {
        let raw = self
            .dispatch(AgentCommand::Screenshot, to_payload(&payload)?, ctx)
            .await?;
        let result: ScreenshotResult = serde_json::from_value(raw).map_err(|err| {
            StructuredError::internal("Agent returned a malformed screenshot result")
                .with_details(json!({ "cause": err.to_string() }))
        })?;
        let png = decode_image_data(&result.data)?;
        Ok(Screenshot {
            tab_id: result.tab_id,
            png,
        })
    }
}

/// Accepts plain base64 or a `data:image/png;base64,` URL.
fn decode_image_data(data: &str) -> Result<Vec<u8>, StructuredError> {
    let encoded = match data.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, body)| body),
        None => data,
    };
    STANDARD.decode(encoded.trim()).map_err(|err| {
        StructuredError::internal("Agent returned screenshot data that is not base64")
            .with_details(json!({ "cause": err.to_string() }))
    })
}

pub(super) async fn write_artifact(path: &Path, bytes: &[u8]) -> Result<(), StructuredError> {
    let io_error = |operation: &str, err: std::io::Error| {
        StructuredError::internal(format!("Failed to {operation}: {err}"))
            .with_details(json!({ "path": path }))
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| io_error("create artifact directory", err))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|err| io_error("write artifact", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_and_data_url() {
        let encoded = STANDARD.encode(b"png-bytes");
        assert_eq!(decode_image_data(&encoded).unwrap(), b"png-bytes");
        let url = format!("data:image/png;base64,{encoded}");
        assert_eq!(decode_image_data(&url).unwrap(), b"png-bytes");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_image_data("not base64 !!").unwrap_err();
        assert_eq!(err.code.as_str(), "INTERNAL");
    }
}
