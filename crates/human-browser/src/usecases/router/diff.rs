use std::path::Path;
use std::path::PathBuf;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use super::CommandRouter;
use super::RequestContext;
use super::to_payload;
use crate::adapters::rpc::params::DiffScreenshotArgs;
use crate::adapters::rpc::params::DiffSnapshotArgs;
use crate::adapters::rpc::params::DiffUrlArgs;
use crate::adapters::rpc::params::NavigateArgs;
use crate::adapters::rpc::params::ScreenshotPayload;
use crate::domain::StructuredError;
use crate::domain::diff::BaselineFormat;
use crate::domain::diff::ImageDiffError;
use crate::domain::diff::ImageDiffReport;
use crate::domain::diff::TextDiff;
use crate::domain::diff::diff_images;
use crate::domain::diff::diff_text;
use crate::domain::diff::pixel::DEFAULT_THRESHOLD;
use crate::domain::diff::pixel::validate_threshold;

/// Failures reading a diff baseline or running the image comparison.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("Baseline not found: {}", path.display())]
    BaselineMissing { path: PathBuf },
    #[error("Failed to read baseline {}: {source}", path.display())]
    BaselineRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Image(#[from] ImageDiffError),
    #[error("Diff worker failed: {0}")]
    Worker(String),
}

impl From<DiffError> for StructuredError {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::BaselineMissing { ref path } => StructuredError::not_found(err.to_string())
                .with_details(json!({ "baseline": path })),
            DiffError::BaselineRead { ref path, .. } => {
                StructuredError::bad_request(err.to_string())
                    .with_details(json!({ "baseline": path }))
            }
            DiffError::Image(inner) => inner.into(),
            DiffError::Worker(_) => StructuredError::internal(err.to_string()),
        }
    }
}

fn baseline_io_error(path: &Path, source: std::io::Error) -> DiffError {
    if source.kind() == std::io::ErrorKind::NotFound {
        DiffError::BaselineMissing {
            path: path.to_path_buf(),
        }
    } else {
        DiffError::BaselineRead {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Runs the line diff off the async workers; large trees are CPU bound.
async fn run_text_diff(before: String, after: String) -> Result<TextDiff, DiffError> {
    tokio::task::spawn_blocking(move || diff_text(&before, &after))
        .await
        .map_err(|err| DiffError::Worker(err.to_string()))
}

/// Runs the pixel diff off the async workers.
async fn run_image_diff(
    baseline: Vec<u8>,
    format: BaselineFormat,
    current_png: Vec<u8>,
    threshold: f64,
    output: PathBuf,
) -> Result<ImageDiffReport, DiffError> {
    let report = tokio::task::spawn_blocking(move || {
        diff_images(&baseline, format, &current_png, Some(threshold), &output)
    })
    .await
    .map_err(|err| DiffError::Worker(err.to_string()))??;
    Ok(report)
}

impl CommandRouter {
    /// Text diff of a baseline tree against a freshly recorded snapshot.
    pub(super) async fn diff_snapshot(
        &self,
        args: DiffSnapshotArgs,
        ctx: &RequestContext,
    ) -> Result<Value, StructuredError> {
        let baseline_tree = self.load_baseline_tree(&args.baseline).await?;
        let current = self
            .capture_snapshot(args.target, args.options, ctx)
            .await?;
        let diff = run_text_diff(baseline_tree, current.tree.clone()).await?;

        let mut response = to_payload(&diff)?;
        if let Value::Object(map) = &mut response {
            map.insert("baseline".to_string(), json!(args.baseline));
            map.insert("snapshot_id".to_string(), json!(current.snapshot_id));
            map.insert("tab_id".to_string(), json!(current.tab_id));
        }
        Ok(response)
    }

    /// A registry snapshot id wins over a file of the same name.
    async fn load_baseline_tree(&self, baseline: &str) -> Result<String, StructuredError> {
        let recorded = self
            .lock_registry()
            .get(baseline)
            .map(|snapshot| snapshot.tree.clone());
        if let Some(tree) = recorded {
            return Ok(tree);
        }
        let path = PathBuf::from(baseline);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| baseline_io_error(&path, err))?;
        Ok(text.trim_end_matches(['\r', '\n']).to_string())
    }

    pub(super) async fn diff_screenshot(
        &self,
        args: DiffScreenshotArgs,
        ctx: &RequestContext,
    ) -> Result<Value, StructuredError> {
        let threshold = validate_threshold(args.threshold.unwrap_or(DEFAULT_THRESHOLD))
            .map_err(DiffError::from)?;
        let baseline_path = PathBuf::from(&args.baseline);
        let baseline = tokio::fs::read(&baseline_path)
            .await
            .map_err(|err| baseline_io_error(&baseline_path, err))?;
        let format = BaselineFormat::detect(&baseline, Some(&baseline_path));

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
        let output = args
            .output
            .map(PathBuf::from)
            .unwrap_or_else(|| self.artifact_path("diff"));
        let report = run_image_diff(baseline, format, shot.png, threshold, output).await?;

        let mut response = to_payload(&report)?;
        if let Value::Object(map) = &mut response {
            map.insert("baseline".to_string(), json!(args.baseline));
            map.insert("tab_id".to_string(), json!(shot.tab_id));
        }
        Ok(response)
    }

    /// Navigates to `url1` then `url2`, capturing after each load.
    pub(super) async fn diff_url(
        &self,
        args: DiffUrlArgs,
        ctx: &RequestContext,
    ) -> Result<Value, StructuredError> {
        let threshold = validate_threshold(args.threshold.unwrap_or(DEFAULT_THRESHOLD))
            .map_err(DiffError::from)?;
        let screenshot_payload = ScreenshotPayload {
            tab_id: None,
            selector: args.options.selector.clone(),
            full_page: args.full_page,
        };

        let mut captures = Vec::with_capacity(2);
        for url in [&args.url1, &args.url2] {
            self.navigate(
                NavigateArgs {
                    url: url.clone(),
                    tab_id: None,
                    wait_until: args.wait_until.clone(),
                },
                ctx,
            )
            .await?;
            let snapshot = self
                .capture_snapshot(None, args.options.clone(), ctx)
                .await?;
            let shot = if args.screenshot {
                Some(
                    self.capture_screenshot(screenshot_payload.clone(), ctx)
                        .await?,
                )
            } else {
                None
            };
            captures.push((snapshot, shot));
        }

        let (after, after_shot) = captures.pop().ok_or_else(missing_capture)?;
        let (before, before_shot) = captures.pop().ok_or_else(missing_capture)?;

        let text = run_text_diff(before.tree.clone(), after.tree.clone()).await?;
        let mut snapshot_diff = to_payload(&text)?;
        if let Value::Object(map) = &mut snapshot_diff {
            map.insert("before_snapshot_id".to_string(), json!(before.snapshot_id));
            map.insert("after_snapshot_id".to_string(), json!(after.snapshot_id));
        }

        let screenshot_diff = match (before_shot, after_shot) {
            (Some(before_shot), Some(after_shot)) => {
                let output = args
                    .output
                    .map(PathBuf::from)
                    .unwrap_or_else(|| self.artifact_path("diff"));
                let report = run_image_diff(
                    before_shot.png,
                    BaselineFormat::Png,
                    after_shot.png,
                    threshold,
                    output,
                )
                .await?;
                Some(to_payload(&report)?)
            }
            _ => None,
        };

        Ok(json!({
            "url1": args.url1,
            "url2": args.url2,
            "snapshot": snapshot_diff,
            "screenshot": screenshot_diff,
        }))
    }
}

fn missing_capture() -> StructuredError {
    StructuredError::internal("diff_url finished without both captures")
}
