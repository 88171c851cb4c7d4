//! Pixel-distance diff between a baseline image and a fresh PNG capture.

use std::path::Path;
use std::path::PathBuf;

use image::ImageFormat;
use image::Rgba;
use image::RgbaImage;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::domain::error::StructuredError;

pub const DEFAULT_THRESHOLD: f64 = 0.1;

const DIFF_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const GHOST_FACTOR: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineFormat {
    Png,
    Jpeg,
}

impl BaselineFormat {
    /// Sniffs magic bytes first, then falls back to the file extension.
    pub fn detect(bytes: &[u8], path: Option<&Path>) -> Self {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return BaselineFormat::Jpeg;
        }
        if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            return BaselineFormat::Png;
        }
        let extension = path
            .and_then(Path::extension)
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("jpg") | Some("jpeg") => BaselineFormat::Jpeg,
            _ => BaselineFormat::Png,
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            BaselineFormat::Png => ImageFormat::Png,
            BaselineFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

#[derive(Debug, Error)]
pub enum ImageDiffError {
    #[error("Threshold must be between 0 and 1, got {0}")]
    InvalidThreshold(f64),
    #[error("Failed to decode {which} image: {source}")]
    Decode {
        which: &'static str,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to encode diff image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("Diff buffer does not match {width}x{height}")]
    Buffer { width: u32, height: u32 },
    #[error("Failed to write diff image ({operation}): {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl From<ImageDiffError> for StructuredError {
    fn from(err: ImageDiffError) -> Self {
        match &err {
            ImageDiffError::InvalidThreshold(value) => {
                StructuredError::bad_request(err.to_string())
                    .with_details(json!({ "threshold": value }))
            }
            ImageDiffError::Decode {
                which: "baseline", ..
            } => StructuredError::bad_request(err.to_string()),
            _ => StructuredError::internal(err.to_string()),
        }
    }
}

/// The raw comparison, before anything touches the filesystem.
#[derive(Debug, Clone)]
pub struct PixelDiff {
    pub image: RgbaImage,
    pub total_pixels: u64,
    pub different_pixels: u64,
    pub dimension_mismatch: bool,
}

impl PixelDiff {
    pub fn mismatch_percentage(&self) -> f64 {
        if self.dimension_mismatch {
            return 100.0;
        }
        if self.total_pixels == 0 {
            return 0.0;
        }
        let ratio = self.different_pixels as f64 / self.total_pixels as f64;
        (ratio * 10_000.0).round() / 100.0
    }

    pub fn is_match(&self) -> bool {
        !self.dimension_mismatch && self.different_pixels == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDiffReport {
    pub diff_path: PathBuf,
    pub total_pixels: u64,
    pub different_pixels: u64,
    pub mismatch_percentage: f64,
    #[serde(rename = "match")]
    pub is_match: bool,
    pub dimension_mismatch: bool,
}

pub fn validate_threshold(threshold: f64) -> Result<f64, ImageDiffError> {
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(ImageDiffError::InvalidThreshold(threshold));
    }
    Ok(threshold)
}

/// Compares two RGBA buffers pixel by pixel.
///
/// A pixel differs when its Euclidean RGB distance exceeds
/// `threshold * 255 * sqrt(3)`. Differing pixels are painted red; matching
/// ones keep 30% of the baseline color.
pub fn diff_pixels(
    baseline: &RgbaImage,
    current: &RgbaImage,
    threshold: f64,
) -> Result<PixelDiff, ImageDiffError> {
    let threshold = validate_threshold(threshold)?;

    if baseline.dimensions() != current.dimensions() {
        let area = |img: &RgbaImage| u64::from(img.width()) * u64::from(img.height());
        let total_pixels = area(baseline).max(area(current));
        return Ok(PixelDiff {
            image: RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0])),
            total_pixels,
            different_pixels: total_pixels,
            dimension_mismatch: true,
        });
    }

    let (width, height) = baseline.dimensions();
    let max_distance = threshold * 255.0 * 3f64.sqrt();
    let mut different_pixels = 0u64;
    let mut pixels = Vec::with_capacity(baseline.as_raw().len());

    for (a, b) in baseline.pixels().zip(current.pixels()) {
        let dr = f64::from(a[0]) - f64::from(b[0]);
        let dg = f64::from(a[1]) - f64::from(b[1]);
        let db = f64::from(a[2]) - f64::from(b[2]);
        let distance = (dr * dr + dg * dg + db * db).sqrt();

        if distance > max_distance {
            different_pixels += 1;
            pixels.extend_from_slice(&DIFF_COLOR.0);
        } else {
            pixels.extend_from_slice(&[ghost(a[0]), ghost(a[1]), ghost(a[2]), 255]);
        }
    }

    let image = RgbaImage::from_raw(width, height, pixels)
        .ok_or(ImageDiffError::Buffer { width, height })?;

    Ok(PixelDiff {
        image,
        total_pixels: u64::from(width) * u64::from(height),
        different_pixels,
        dimension_mismatch: false,
    })
}

fn ghost(channel: u8) -> u8 {
    (f64::from(channel) * GHOST_FACTOR).round() as u8
}

/// Decodes both images, compares them, and writes the diff PNG to `output`.
pub fn diff_images(
    baseline: &[u8],
    baseline_format: BaselineFormat,
    current_png: &[u8],
    threshold: Option<f64>,
    output: &Path,
) -> Result<ImageDiffReport, ImageDiffError> {
    let threshold = validate_threshold(threshold.unwrap_or(DEFAULT_THRESHOLD))?;

    let baseline = image::load_from_memory_with_format(baseline, baseline_format.image_format())
        .map_err(|source| ImageDiffError::Decode {
            which: "baseline",
            source,
        })?
        .to_rgba8();
    let current = image::load_from_memory_with_format(current_png, ImageFormat::Png)
        .map_err(|source| ImageDiffError::Decode {
            which: "current",
            source,
        })?
        .to_rgba8();

    let diff = diff_pixels(&baseline, &current, threshold)?;
    write_png(&diff.image, output)?;

    Ok(ImageDiffReport {
        diff_path: output.to_path_buf(),
        total_pixels: diff.total_pixels,
        different_pixels: diff.different_pixels,
        mismatch_percentage: diff.mismatch_percentage(),
        is_match: diff.is_match(),
        dimension_mismatch: diff.dimension_mismatch,
    })
}

fn write_png(image: &RgbaImage, output: &Path) -> Result<(), ImageDiffError> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ImageDiffError::Io {
            operation: "create output directory",
            source,
        })?;
    }
    image
        .save_with_format(output, ImageFormat::Png)
        .map_err(ImageDiffError::Encode)
}
