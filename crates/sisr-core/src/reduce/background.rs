use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{
    DEFAULT_BACKGROUND_SIGMA, DEFAULT_CLIP_ITERATIONS, DEFAULT_MASK_DILATE_SIZE,
    DEFAULT_MASK_NPIXELS, DEFAULT_MASK_SIGMA, DEFAULT_MASK_SNR, DEFAULT_MESH_FILTER_SIZE,
    DEFAULT_MESH_SIZE,
};
use crate::error::{Result, SisrError};
use crate::stats;

use super::mask::{source_mask, SourceMaskParams};
use super::mesh::mesh_background;

/// Global statistic subtracted as a constant background.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundStatistic {
    Mean,
    #[default]
    Median,
}

impl fmt::Display for BackgroundStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundStatistic::Mean => write!(f, "mean"),
            BackgroundStatistic::Median => write!(f, "median"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaBackground {
    pub sigma: f32,
    pub iterations: usize,
    pub statistic: BackgroundStatistic,
}

impl Default for SigmaBackground {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_BACKGROUND_SIGMA,
            iterations: DEFAULT_CLIP_ITERATIONS,
            statistic: BackgroundStatistic::Median,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskBackground {
    /// Sources are pixels above median + snr * std.
    pub snr: f32,
    /// Minimum connected pixels for a source.
    pub npixels: usize,
    /// Side of the square the source mask is dilated with.
    pub dilate_size: usize,
    /// Background mesh tile size in pixels.
    pub mesh_size: usize,
    /// Median filter size over the tile grid.
    pub filter_size: usize,
    /// Clipping sigma for all statistics.
    pub sigma: f32,
}

impl Default for MaskBackground {
    fn default() -> Self {
        Self {
            snr: DEFAULT_MASK_SNR,
            npixels: DEFAULT_MASK_NPIXELS,
            dilate_size: DEFAULT_MASK_DILATE_SIZE,
            mesh_size: DEFAULT_MESH_SIZE,
            filter_size: DEFAULT_MESH_FILTER_SIZE,
            sigma: DEFAULT_MASK_SIGMA,
        }
    }
}

/// How the sky background is estimated and removed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum BackgroundPolicy {
    /// Subtract the global mean or median.
    Simple {
        #[serde(default)]
        statistic: BackgroundStatistic,
    },
    /// Subtract a sigma-clipped statistic.
    Sigma(SigmaBackground),
    /// Mask sources, then subtract an interpolated mesh background.
    Mask(MaskBackground),
    /// Leave the background in place.
    None,
}

impl Default for BackgroundPolicy {
    fn default() -> Self {
        BackgroundPolicy::Sigma(SigmaBackground::default())
    }
}

impl fmt::Display for BackgroundPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackgroundPolicy::Simple { statistic } => write!(f, "simple {statistic}"),
            BackgroundPolicy::Sigma(p) => {
                write!(f, "sigma-clipped {} (sigma={})", p.statistic, p.sigma)
            }
            BackgroundPolicy::Mask(p) => {
                write!(f, "masked mesh (snr={}, mesh={})", p.snr, p.mesh_size)
            }
            BackgroundPolicy::None => write!(f, "none"),
        }
    }
}

/// Background model removed from a frame.
#[derive(Clone, Debug)]
pub enum BackgroundModel {
    Constant(f32),
    Map(Array2<f32>),
}

#[derive(Clone, Debug)]
pub struct BackgroundEstimate {
    pub model: BackgroundModel,
    /// Representative level: the constant, or the median of the map.
    pub level: f64,
    /// Pixels excluded as sources (mask policy only).
    pub masked_pixels: usize,
}

/// Estimate the background under `policy`. `None` means nothing to subtract.
pub fn estimate_background(
    data: &Array2<f32>,
    policy: &BackgroundPolicy,
) -> Result<Option<BackgroundEstimate>> {
    let constant = |level: f64| BackgroundEstimate {
        model: BackgroundModel::Constant(level as f32),
        level,
        masked_pixels: 0,
    };

    match policy {
        BackgroundPolicy::None => Ok(None),
        BackgroundPolicy::Simple { statistic } => {
            let mut values = stats::finite_values(data);
            let level = match statistic {
                BackgroundStatistic::Mean => stats::mean(&values),
                BackgroundStatistic::Median => stats::median(&mut values),
            }
            .ok_or_else(no_finite_pixels)?;
            Ok(Some(constant(level)))
        }
        BackgroundPolicy::Sigma(params) => {
            let values = stats::finite_values(data);
            let clipped = stats::sigma_clipped_stats(&values, params.sigma, params.iterations)
                .ok_or_else(no_finite_pixels)?;
            let level = match params.statistic {
                BackgroundStatistic::Mean => clipped.mean,
                BackgroundStatistic::Median => clipped.median,
            };
            debug!(
                level,
                std = clipped.std,
                retained = clipped.retained,
                "Sigma-clipped background"
            );
            Ok(Some(constant(level)))
        }
        BackgroundPolicy::Mask(params) => {
            let mask = source_mask(
                data,
                &SourceMaskParams {
                    snr: params.snr,
                    npixels: params.npixels,
                    dilate_size: params.dilate_size,
                    sigma: params.sigma,
                    iterations: DEFAULT_CLIP_ITERATIONS,
                },
            );
            let masked_pixels = mask.iter().filter(|&&m| m).count();
            let map =
                mesh_background(data, &mask, params.mesh_size, params.filter_size, params.sigma)?;
            let mut levels: Vec<f32> = map.iter().copied().collect();
            let level = stats::median(&mut levels).unwrap_or(0.0);
            debug!(level, masked_pixels, "Mesh background");
            Ok(Some(BackgroundEstimate {
                model: BackgroundModel::Map(map),
                level,
                masked_pixels,
            }))
        }
    }
}

/// Subtract the background chosen by `policy`, returning a new array.
pub fn subtract_background(
    data: &Array2<f32>,
    policy: &BackgroundPolicy,
) -> Result<(Array2<f32>, Option<BackgroundEstimate>)> {
    let estimate = estimate_background(data, policy)?;
    let result = match &estimate {
        None => data.clone(),
        Some(BackgroundEstimate {
            model: BackgroundModel::Constant(level),
            ..
        }) => data.mapv(|v| v - level),
        Some(BackgroundEstimate {
            model: BackgroundModel::Map(map),
            ..
        }) => data - map,
    };
    Ok((result, estimate))
}

fn no_finite_pixels() -> SisrError {
    SisrError::Config("frame has no finite pixels for background estimation".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_simple_median_subtraction() {
        let mut data = Array2::from_elem((5, 5), 10.0f32);
        data[[2, 2]] = 1000.0;
        let (out, est) = subtract_background(
            &data,
            &BackgroundPolicy::Simple {
                statistic: BackgroundStatistic::Median,
            },
        )
        .unwrap();
        assert_abs_diff_eq!(est.unwrap().level, 10.0);
        assert_abs_diff_eq!(out[[0, 0]], 0.0);
        assert_abs_diff_eq!(out[[2, 2]], 990.0);
    }

    #[test]
    fn test_none_policy_leaves_data() {
        let data = Array2::from_elem((3, 3), 4.0f32);
        let (out, est) = subtract_background(&data, &BackgroundPolicy::None).unwrap();
        assert!(est.is_none());
        assert_eq!(out, data);
    }

    #[test]
    fn test_mask_policy_ignores_bright_source() {
        let mut data = Array2::from_elem((64, 64), 50.0f32);
        for row in 30..36 {
            for col in 30..36 {
                data[[row, col]] = 5000.0;
            }
        }
        let policy = BackgroundPolicy::Mask(MaskBackground {
            mesh_size: 16,
            dilate_size: 5,
            ..Default::default()
        });
        let (out, est) = subtract_background(&data, &policy).unwrap();
        let est = est.unwrap();
        assert!(est.masked_pixels >= 36);
        assert_abs_diff_eq!(est.level, 50.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out[[5, 5]], 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_policy_parses_from_tagged_form() {
        let policy: BackgroundPolicy =
            serde_json::from_str(r#"{"method": "sigma", "sigma": 3.0}"#).unwrap();
        match policy {
            BackgroundPolicy::Sigma(p) => {
                assert_eq!(p.sigma, 3.0);
                assert_eq!(p.iterations, DEFAULT_CLIP_ITERATIONS);
            }
            other => panic!("unexpected policy {other:?}"),
        }
    }
}
