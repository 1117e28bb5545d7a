//! Normalized mean brightness using the ITU-R BT.601 luminance formula.

use image::DynamicImage;

/// Exposure context of the image being measured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementContext {
    pub shutter_us: u64,
    pub gain: f64,
}

/// Scores a captured image for the exposure feedback loop.
///
/// Returns a mean in `[0, 1]`, or `None` when no measurement could be made.
pub trait MeanEstimator {
    fn estimate(&mut self, image: &DynamicImage, context: &MeasurementContext) -> Option<f64>;
}

/// Whole-frame luminance mean.
#[derive(Debug, Default, Clone, Copy)]
pub struct LumaMeanEstimator;

impl MeanEstimator for LumaMeanEstimator {
    fn estimate(&mut self, image: &DynamicImage, _context: &MeasurementContext) -> Option<f64> {
        luma_mean(image)
    }
}

/// Mean luminance of an image, normalized to `[0, 1]`.
///
/// 8-bit and 16-bit images are both measured on a 16-bit scale. Coefficients
/// are scaled by 1000 (299 + 587 + 114) to keep the per-pixel math integral.
///
/// Returns `None` for an empty image.
pub fn luma_mean(image: &DynamicImage) -> Option<f64> {
    let rgb = image.to_rgb16();
    let pixel_count = rgb.width() as u64 * rgb.height() as u64;
    if pixel_count == 0 {
        return None;
    }

    let sum: u64 = rgb
        .as_raw()
        .chunks_exact(3)
        .map(|px| {
            let r = px[0] as u64;
            let g = px[1] as u64;
            let b = px[2] as u64;
            (299 * r + 587 * g + 114 * b) / 1000
        })
        .sum();

    let mean = sum as f64 / pixel_count as f64 / u16::MAX as f64;
    mean.is_finite().then(|| mean.clamp(0.0, 1.0))
}
