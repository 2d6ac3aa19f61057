use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_ARTIFACT_CONTRAST, DEFAULT_ARTIFACT_SIGCLIP};
use crate::error::Result;
use crate::stats;

/// Cleaned pixels plus the mask of pixels that were replaced.
#[derive(Clone, Debug)]
pub struct ArtifactResult {
    pub clean: Array2<f32>,
    pub mask: Array2<bool>,
}

impl ArtifactResult {
    pub fn flagged(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }
}

/// Detects and repairs transient artifacts such as cosmic-ray hits.
pub trait ArtifactRemover: Send + Sync {
    fn name(&self) -> &str;

    fn detect_artifacts(&self, data: &Array2<f32>) -> Result<ArtifactResult>;
}

/// Passes frames through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoArtifactRemoval;

impl ArtifactRemover for NoArtifactRemoval {
    fn name(&self) -> &str {
        "none"
    }

    fn detect_artifacts(&self, data: &Array2<f32>) -> Result<ArtifactResult> {
        Ok(ArtifactResult {
            clean: data.clone(),
            mask: Array2::from_elem(data.dim(), false),
        })
    }
}

/// Flags pixels that stand out sharply from their 3x3 neighbourhood.
///
/// A pixel is flagged when its excess over the local median exceeds
/// `sigclip` times the robust noise of the excess image, and also exceeds
/// `contrast` times the local median's height above the global background.
/// The second test keeps the cores of resolved stars. Flagged pixels are
/// replaced by the median of unflagged pixels in their 5x5 neighbourhood.
#[derive(Clone, Debug, PartialEq)]
pub struct MedianArtifactRemover {
    pub sigclip: f32,
    pub contrast: f32,
}

impl Default for MedianArtifactRemover {
    fn default() -> Self {
        Self {
            sigclip: DEFAULT_ARTIFACT_SIGCLIP,
            contrast: DEFAULT_ARTIFACT_CONTRAST,
        }
    }
}

impl ArtifactRemover for MedianArtifactRemover {
    fn name(&self) -> &str {
        "median"
    }

    fn detect_artifacts(&self, data: &Array2<f32>) -> Result<ArtifactResult> {
        let (h, w) = data.dim();
        let local = local_median(data, 1, None);
        let excess = data - &local;

        let noise = stats::mad_std(&stats::finite_values(&excess)).unwrap_or(0.0) as f32;
        let mut values = stats::finite_values(data);
        let background = stats::median(&mut values).unwrap_or(0.0) as f32;

        let threshold = self.sigclip * noise;
        let mask = Array2::from_shape_fn((h, w), |(row, col)| {
            let e = excess[[row, col]];
            let m = local[[row, col]];
            e.is_finite() && e > threshold && e > self.contrast * (m - background)
        });

        let clean = if mask.iter().any(|&m| m) {
            let replacement = local_median(data, 2, Some(&mask));
            Array2::from_shape_fn((h, w), |(row, col)| {
                if mask[[row, col]] {
                    replacement[[row, col]]
                } else {
                    data[[row, col]]
                }
            })
        } else {
            data.clone()
        };

        Ok(ArtifactResult { clean, mask })
    }
}

/// Median over a (2r+1)^2 window truncated at the border, skipping
/// non-finite values and, when given, masked pixels. Windows with nothing
/// usable keep the centre value.
fn local_median(data: &Array2<f32>, radius: usize, exclude: Option<&Array2<bool>>) -> Array2<f32> {
    let (h, w) = data.dim();
    let mut window = Vec::with_capacity((2 * radius + 1).pow(2));
    Array2::from_shape_fn((h, w), |(row, col)| {
        window.clear();
        for r in row.saturating_sub(radius)..(row + radius + 1).min(h) {
            for c in col.saturating_sub(radius)..(col + radius + 1).min(w) {
                let v = data[[r, c]];
                let skipped = exclude.is_some_and(|m| m[[r, c]]);
                if v.is_finite() && !skipped {
                    window.push(v);
                }
            }
        }
        stats::median(&mut window).map_or(data[[row, col]], |m| m as f32)
    })
}

/// Settings for the built-in artifact remover.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub enabled: bool,
    pub sigclip: f32,
    pub contrast: f32,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sigclip: DEFAULT_ARTIFACT_SIGCLIP,
            contrast: DEFAULT_ARTIFACT_CONTRAST,
        }
    }
}

impl ArtifactConfig {
    pub fn build(&self) -> Box<dyn ArtifactRemover> {
        if self.enabled {
            Box::new(MedianArtifactRemover {
                sigclip: self.sigclip,
                contrast: self.contrast,
            })
        } else {
            Box::new(NoArtifactRemoval)
        }
    }
}
