pub mod mean;
pub mod median;
pub mod sigma_clip;

use std::fmt;
use std::path::PathBuf;

use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{Result, SisrError};
use crate::frame::Frame;
use crate::io::FitsReader;

pub use sigma_clip::SigmaClipParams;

/// Per-pixel reduction applied across a group of frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMethod {
    #[default]
    Median,
    Mean,
    Sum,
}

impl fmt::Display for CombineMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombineMethod::Median => write!(f, "median"),
            CombineMethod::Mean => write!(f, "mean"),
            CombineMethod::Sum => write!(f, "sum"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineOptions {
    pub method: CombineMethod,
    /// Optional outlier rejection before the reduction.
    pub sigma_clip: Option<SigmaClipParams>,
    /// Bound on the pixel data held in memory while combining from disk.
    pub memory_limit_bytes: Option<usize>,
}

impl CombineOptions {
    pub fn with_method(method: CombineMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }
}

/// Combine equally shaped arrays pixel by pixel.
///
/// Non-finite samples are ignored; a pixel with no finite sample becomes NaN.
/// A single-member group is returned unchanged.
pub fn combine(arrays: &[Array2<f32>], options: &CombineOptions) -> Result<Array2<f32>> {
    let views: Vec<ArrayView2<f32>> = arrays.iter().map(|a| a.view()).collect();
    combine_views(&views, options)
}

/// Combine frames, carrying the first frame's header plus provenance cards.
pub fn combine_frames(frames: &[Frame], options: &CombineOptions) -> Result<Frame> {
    let views: Vec<ArrayView2<f32>> = frames.iter().map(|f| f.data.view()).collect();
    let data = combine_views(&views, options)?;
    let mut header = frames[0].header.clone();
    annotate(&mut header, frames.len(), options);
    Ok(Frame::with_header(data, header))
}

/// Combine frames straight from disk, holding at most one band of rows per
/// frame in memory. The result does not depend on the band size.
pub fn combine_paths(paths: &[PathBuf], options: &CombineOptions) -> Result<Frame> {
    if paths.is_empty() {
        return Err(SisrError::EmptyGroup);
    }

    let readers = paths
        .iter()
        .map(|p| FitsReader::open(p))
        .collect::<Result<Vec<_>>>()?;

    let (h, w) = readers[0].shape();
    for reader in &readers[1..] {
        if reader.shape() != (h, w) {
            return Err(SisrError::ShapeMismatch {
                expected: (h, w),
                actual: reader.shape(),
            });
        }
    }

    let band = options
        .memory_limit_bytes
        .map(|limit| band_rows(w, readers.len(), limit))
        .unwrap_or(h)
        .min(h);
    info!(
        frames = readers.len(),
        method = %options.method,
        band_rows = band,
        "Combining frames"
    );

    let mut result = Array2::<f32>::zeros((h, w));
    let mut start = 0;
    while start < h {
        let count = band.min(h - start);
        let bands = readers
            .iter()
            .map(|r| r.read_rows(start, count))
            .collect::<Result<Vec<_>>>()?;
        let views: Vec<ArrayView2<f32>> = bands.iter().map(|b| b.view()).collect();
        let combined = combine_views(&views, options)?;
        result
            .slice_mut(s![start..start + count, ..])
            .assign(&combined);
        debug!(start, count, "Combined row band");
        start += count;
    }

    let mut header = readers[0].header.clone();
    annotate(&mut header, readers.len(), options);
    Ok(Frame::with_header(result, header))
}

/// Rows per band so that one band from every frame fits in `limit` bytes.
pub fn band_rows(width: usize, frame_count: usize, limit: usize) -> usize {
    let row_bytes = width.max(1) * frame_count.max(1) * std::mem::size_of::<f32>();
    (limit / row_bytes).max(1)
}

fn annotate(header: &mut crate::frame::FrameHeader, count: usize, options: &CombineOptions) {
    header.set_with_comment("NCOMBINE", count, Some("number of frames combined"));
    header.set_with_comment(
        "COMBMETH",
        options.method.to_string(),
        Some("per-pixel combination"),
    );
    if let Some(clip) = &options.sigma_clip {
        header.set_with_comment("CLIPSIG", clip.sigma as f64, Some("sigma-clip rejection"));
    }
}

fn combine_views(views: &[ArrayView2<f32>], options: &CombineOptions) -> Result<Array2<f32>> {
    let Some(first) = views.first() else {
        return Err(SisrError::EmptyGroup);
    };
    let (h, w) = first.dim();
    for view in &views[1..] {
        if view.dim() != (h, w) {
            return Err(SisrError::ShapeMismatch {
                expected: (h, w),
                actual: view.dim(),
            });
        }
    }

    if views.len() == 1 {
        return Ok(first.to_owned());
    }

    let mut result = Array2::<f32>::zeros((h, w));
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        // Row-parallel: each row owns its scratch buffers
        let rows: Vec<Vec<f32>> = (0..h)
            .into_par_iter()
            .map(|row| {
                let mut scratch = PixelScratch::with_capacity(views.len());
                let mut out = vec![0.0f32; w];
                combine_row(views, row, &mut out, &mut scratch, options);
                out
            })
            .collect();
        for (row, values) in rows.into_iter().enumerate() {
            for (col, v) in values.into_iter().enumerate() {
                result[[row, col]] = v;
            }
        }
    } else {
        let mut scratch = PixelScratch::with_capacity(views.len());
        let mut out = vec![0.0f32; w];
        for row in 0..h {
            combine_row(views, row, &mut out, &mut scratch, options);
            for (col, &v) in out.iter().enumerate() {
                result[[row, col]] = v;
            }
        }
    }
    Ok(result)
}

struct PixelScratch {
    values: Vec<f32>,
    clip: Vec<f32>,
}

impl PixelScratch {
    fn with_capacity(n: usize) -> Self {
        Self {
            values: Vec::with_capacity(n),
            clip: Vec::with_capacity(n),
        }
    }
}

fn combine_row(
    views: &[ArrayView2<f32>],
    row: usize,
    out: &mut [f32],
    scratch: &mut PixelScratch,
    options: &CombineOptions,
) {
    for (col, result) in out.iter_mut().enumerate() {
        scratch.values.clear();
        scratch.values.extend(
            views
                .iter()
                .map(|v| v[[row, col]])
                .filter(|v| v.is_finite()),
        );
        *result = combine_pixel(scratch, options);
    }
}

fn combine_pixel(scratch: &mut PixelScratch, options: &CombineOptions) -> f32 {
    if let Some(params) = &options.sigma_clip {
        sigma_clip::clip_in_place(&mut scratch.values, &mut scratch.clip, params);
    }
    match options.method {
        CombineMethod::Median => median::median_of(&mut scratch.values),
        CombineMethod::Mean => mean::mean_of(&scratch.values),
        CombineMethod::Sum => mean::sum_of(&scratch.values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_rows_never_zero() {
        assert_eq!(band_rows(1000, 10, 1), 1);
        assert_eq!(band_rows(10, 2, 800), 10);
    }

    #[test]
    fn test_method_display_matches_serde_names() {
        let parsed: CombineMethod = serde_json::from_str("\"mean\"").unwrap();
        assert_eq!(parsed, CombineMethod::Mean);
        assert_eq!(CombineMethod::Sum.to_string(), "sum");
    }
}
