use std::path::Path;

use image::{GrayImage, ImageFormat, Luma};

use crate::consts::EPSILON;
use crate::error::{Result, SisrError};
use crate::frame::Frame;

/// Percentile-based black/white points over the finite pixels.
///
/// `low_percentile` and `high_percentile` are in [0.0, 1.0].
pub fn stretch_limits(
    frame: &Frame,
    low_percentile: f32,
    high_percentile: f32,
) -> Option<(f32, f32)> {
    let mut sorted: Vec<f32> = frame.data.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f32::total_cmp);

    let n = sorted.len();
    let lo_idx = ((n as f32 * low_percentile) as usize).min(n - 1);
    let hi_idx = ((n as f32 * high_percentile) as usize).min(n - 1);
    Some((sorted[lo_idx], sorted[hi_idx]))
}

/// Save an auto-stretched 8-bit PNG preview of a frame. Non-finite pixels render black.
pub fn save_preview(
    frame: &Frame,
    path: &Path,
    low_percentile: f32,
    high_percentile: f32,
) -> Result<()> {
    let (black, white) = stretch_limits(frame, low_percentile, high_percentile)
        .ok_or_else(|| SisrError::Config("frame has no finite pixels to preview".into()))?;
    let range = white - black;
    let range = if range.abs() < EPSILON { 1.0 } else { range };

    let (h, w) = frame.shape();
    let mut img = GrayImage::new(w as u32, h as u32);
    for row in 0..h {
        for col in 0..w {
            let v = frame.data[[row, col]];
            let level = if v.is_finite() {
                (((v - black) / range).clamp(0.0, 1.0) * 255.0) as u8
            } else {
                0
            };
            // FITS row 0 is the bottom of the image.
            img.put_pixel(col as u32, (h - 1 - row) as u32, Luma([level]));
        }
    }

    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
