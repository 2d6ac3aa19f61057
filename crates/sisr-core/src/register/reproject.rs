use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{Result, SisrError};

use super::phase_correlation::bilinear_sample;
use super::wcs::Wcs;
use super::Reprojector;

/// Resamples a frame onto another frame's TAN grid with bilinear
/// interpolation. Output pixels whose sky position falls outside the
/// target are NaN and absent from the footprint.
#[derive(Clone, Copy, Debug, Default)]
pub struct TanReprojector;

impl Reprojector for TanReprojector {
    fn name(&self) -> &str {
        "tan-reproject"
    }

    fn reproject(
        &self,
        target: &Array2<f32>,
        target_wcs: &Wcs,
        reference_wcs: &Wcs,
        shape: (usize, usize),
    ) -> Result<(Array2<f32>, Array2<bool>)> {
        let (h, w) = shape;
        if h == 0 || w == 0 {
            return Err(SisrError::Registration("empty output shape".into()));
        }

        let sample_row = |row: usize| -> Vec<f32> {
            (0..w)
                .map(|col| {
                    let (ra, dec) =
                        reference_wcs.pixel_to_world(col as f64 + 1.0, row as f64 + 1.0);
                    match target_wcs.world_to_pixel(ra, dec) {
                        Some((x, y)) => bilinear_sample(target, y - 1.0, x - 1.0),
                        None => f32::NAN,
                    }
                })
                .collect()
        };

        let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
            (0..h).into_par_iter().map(sample_row).collect()
        } else {
            (0..h).map(sample_row).collect()
        };

        let data = Array2::from_shape_vec((h, w), rows.into_iter().flatten().collect())
            .map_err(|e| SisrError::Registration(e.to_string()))?;
        let footprint = data.mapv(|v| v.is_finite());
        Ok((data, footprint))
    }
}
