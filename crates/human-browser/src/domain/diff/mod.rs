//! Diff engines. Pure functions over already-captured state.

pub mod pixel;
pub mod text;

pub use pixel::BaselineFormat;
pub use pixel::ImageDiffError;
pub use pixel::ImageDiffReport;
pub use pixel::diff_images;
pub use text::TextDiff;
pub use text::diff_text;
