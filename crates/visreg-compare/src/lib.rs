//! Pixel-identity screenshot comparison for visual regression testing.
//!
//! Similarity is the fraction of pixels that match exactly per channel,
//! not a perceptual metric: anti-aliasing or compression noise counts as a
//! mismatch for that pixel. When an output path is given, a side-by-side
//! composite (expected | actual | amplified diff) is written for debugging.

use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use log::warn;

mod annotate;

/// Height of the caption strip appended below the composite panels.
const CAPTION_HEIGHT: u32 = 50;

/// Amplification factor applied to the raw per-channel diff in the
/// visualization panel.
const DIFF_GAIN: u16 = 10;

/// Outcome of a single image comparison.
pub struct CompareResult {
    /// Fraction of pixels with zero per-channel difference, in `[0, 1]`.
    pub similarity: f64,
    /// `similarity >= threshold`.
    pub passed: bool,
    /// Amplified per-channel difference image.
    pub diff: RgbImage,
}

/// Compare two image files and optionally write an annotated composite.
///
/// Decode failures are errors. A dimension mismatch is not: the larger-area
/// image is resized down to the smaller one's dimensions before diffing.
pub fn compare_images(
    expected_path: &Path,
    actual_path: &Path,
    threshold: f64,
    diff_output: Option<&Path>,
) -> Result<CompareResult> {
    let expected = image::open(expected_path)
        .with_context(|| format!("failed to decode expected image {}", expected_path.display()))?
        .to_rgb8();
    let actual = image::open(actual_path)
        .with_context(|| format!("failed to decode actual image {}", actual_path.display()))?
        .to_rgb8();

    let result = compare_buffers(&expected, &actual, threshold);

    if let Some(out) = diff_output {
        let (expected, actual) = resize_to_match(expected, actual);
        let composite = annotate::composite(&expected, &actual, &result, CAPTION_HEIGHT);
        composite
            .save(out)
            .with_context(|| format!("failed to write diff composite {}", out.display()))?;
    }

    Ok(result)
}

/// Compare two in-memory RGB buffers.
pub fn compare_buffers(expected: &RgbImage, actual: &RgbImage, threshold: f64) -> CompareResult {
    let (expected, actual) = resize_to_match(expected.clone(), actual.clone());

    let (width, height) = expected.dimensions();
    let total = u64::from(width) * u64::from(height);
    let mut identical = 0u64;
    let mut diff = RgbImage::new(width, height);

    for (x, y, out) in diff.enumerate_pixels_mut() {
        let a = expected.get_pixel(x, y);
        let b = actual.get_pixel(x, y);
        let mut channels = [0u8; 3];
        let mut any = false;
        for c in 0..3 {
            let d = a.0[c].abs_diff(b.0[c]);
            any |= d != 0;
            channels[c] = (u16::from(d) * DIFF_GAIN).min(255) as u8;
        }
        if !any {
            identical += 1;
        }
        *out = Rgb(channels);
    }

    let similarity = if total == 0 {
        1.0
    } else {
        identical as f64 / total as f64
    };

    CompareResult {
        similarity,
        passed: similarity >= threshold,
        diff,
    }
}

/// Resize the larger-area image down to the smaller one's dimensions.
fn resize_to_match(a: RgbImage, b: RgbImage) -> (RgbImage, RgbImage) {
    if a.dimensions() == b.dimensions() {
        return (a, b);
    }
    warn!(
        "image sizes differ: {}x{} vs {}x{}, resizing to match",
        a.width(),
        a.height(),
        b.width(),
        b.height()
    );
    let area = |img: &RgbImage| u64::from(img.width()) * u64::from(img.height());
    if area(&a) > area(&b) {
        let resized = image::imageops::resize(&a, b.width(), b.height(), FilterType::Lanczos3);
        (resized, b)
    } else {
        let resized = image::imageops::resize(&b, a.width(), a.height(), FilterType::Lanczos3);
        (a, resized)
    }
}
