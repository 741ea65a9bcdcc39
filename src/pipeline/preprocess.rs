//! Image preprocessing: page bitmap → clean black-on-white bitmap.
//!
//! Scanned rolls arrive as photocopies of photocopies: grey backgrounds,
//! bleed-through and speckle. Tesseract's own binarisation copes poorly with
//! the thin strokes of Devanagari at that noise level, so pages go through
//! three passes first:
//!
//! 1. Convert to 8-bit luma
//! 2. Global Otsu threshold (bimodal ink/paper histogram)
//! 3. 3×3 median filter to drop isolated speckle left by the threshold

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::median_filter;
use tracing::debug;

const INK: u8 = 0;
const PAPER: u8 = 255;

/// Apply all preprocessing passes to a rendered page.
pub fn prepare_for_recognition(image: &DynamicImage) -> DynamicImage {
    let gray = image.to_luma8();
    let level = otsu_level(&gray);
    let binary = binarize(&gray, level);
    let denoised = median_filter(&binary, 1, 1);
    debug!(
        "Preprocessed {}x{} page (otsu level {})",
        denoised.width(),
        denoised.height(),
        level
    );
    DynamicImage::ImageLuma8(denoised)
}

/// Pixels at or below `level` become ink, everything else paper.
fn binarize(gray: &GrayImage, level: u8) -> GrayImage {
    let mut out = gray.clone();
    for Luma([v]) in out.pixels_mut() {
        *v = if *v <= level { INK } else { PAPER };
    }
    out
}
