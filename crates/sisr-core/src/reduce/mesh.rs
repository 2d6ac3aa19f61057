use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::{DEFAULT_CLIP_ITERATIONS, MESH_MIN_VALID_FRACTION};
use crate::error::{Result, SisrError};
use crate::stats;

/// Coarse grid of per-tile background levels with tile centres for interpolation.
struct TileGrid {
    levels: Array2<f32>,
    centers_y: Vec<f64>,
    centers_x: Vec<f64>,
}

/// Smooth background map from tiled sigma-clipped medians.
///
/// 1. Split the image into `mesh_size` tiles and take the sigma-clipped median
///    of each tile's unmasked finite pixels. Tiles with too few usable pixels
///    take the median of the valid tiles.
/// 2. Median-filter the tile grid over `filter_size` x `filter_size` tiles.
/// 3. Bilinearly interpolate between tile centres (clamped at the borders).
pub fn mesh_background(
    data: &Array2<f32>,
    mask: &Array2<bool>,
    mesh_size: usize,
    filter_size: usize,
    sigma: f32,
) -> Result<Array2<f32>> {
    if mesh_size == 0 {
        return Err(SisrError::Config("mesh size must be positive".into()));
    }
    let (h, w) = data.dim();
    let tiles_y = h.div_ceil(mesh_size);
    let tiles_x = w.div_ceil(mesh_size);

    let tile_levels: Vec<Option<f32>> = (0..tiles_y * tiles_x)
        .into_par_iter()
        .map_init(Vec::new, |values, idx| {
            let (ty, tx) = (idx / tiles_x, idx % tiles_x);
            let (y0, y1) = (ty * mesh_size, ((ty + 1) * mesh_size).min(h));
            let (x0, x1) = (tx * mesh_size, ((tx + 1) * mesh_size).min(w));

            values.clear();
            for row in y0..y1 {
                for col in x0..x1 {
                    let v = data[[row, col]];
                    if !mask[[row, col]] && v.is_finite() {
                        values.push(v);
                    }
                }
            }
            let tile_pixels = (y1 - y0) * (x1 - x0);
            let too_few = (values.len() as f32) < MESH_MIN_VALID_FRACTION * tile_pixels as f32;
            if values.is_empty() || too_few {
                return None;
            }
            stats::sigma_clipped_stats(values, sigma, DEFAULT_CLIP_ITERATIONS)
                .map(|s| s.median as f32)
        })
        .collect();

    let mut valid: Vec<f32> = tile_levels.iter().flatten().copied().collect();
    let fill = match stats::median(&mut valid) {
        Some(level) => level as f32,
        None => {
            // Every tile is masked: fall back to the whole frame.
            let values = stats::finite_values(data);
            stats::sigma_clipped_stats(&values, sigma, DEFAULT_CLIP_ITERATIONS)
                .map(|s| s.median as f32)
                .ok_or_else(|| SisrError::Config("frame has no finite pixels".into()))?
        }
    };

    let levels = Array2::from_shape_fn((tiles_y, tiles_x), |(ty, tx)| {
        tile_levels[ty * tiles_x + tx].unwrap_or(fill)
    });
    let grid = TileGrid {
        levels: median_filter(&levels, filter_size),
        centers_y: tile_centers(h, mesh_size),
        centers_x: tile_centers(w, mesh_size),
    };

    Ok(interpolate(&grid, h, w))
}

fn tile_centers(len: usize, mesh_size: usize) -> Vec<f64> {
    (0..len.div_ceil(mesh_size))
        .map(|t| {
            let start = t * mesh_size;
            let end = ((t + 1) * mesh_size).min(len);
            (start + end - 1) as f64 * 0.5
        })
        .collect()
}

/// Median filter over a `size` x `size` window, truncated at the grid border.
fn median_filter(levels: &Array2<f32>, size: usize) -> Array2<f32> {
    if size <= 1 {
        return levels.clone();
    }
    let (h, w) = levels.dim();
    let half = size / 2;
    let mut window = Vec::with_capacity(size * size);
    Array2::from_shape_fn((h, w), |(row, col)| {
        window.clear();
        for r in row.saturating_sub(half)..(row + half + 1).min(h) {
            for c in col.saturating_sub(half)..(col + half + 1).min(w) {
                window.push(levels[[r, c]]);
            }
        }
        stats::median(&mut window).map_or(levels[[row, col]], |m| m as f32)
    })
}

/// Lower tile index and interpolation weight for a coordinate.
fn axis_weight(centers: &[f64], x: f64) -> (usize, usize, f64) {
    let last = centers.len() - 1;
    if x <= centers[0] {
        return (0, 0, 0.0);
    }
    if x >= centers[last] {
        return (last, last, 0.0);
    }
    let i0 = centers.partition_point(|&c| c <= x) - 1;
    let i1 = i0 + 1;
    let t = (x - centers[i0]) / (centers[i1] - centers[i0]);
    (i0, i1, t)
}

fn interpolate(grid: &TileGrid, h: usize, w: usize) -> Array2<f32> {
    let col_weights: Vec<(usize, usize, f64)> = (0..w)
        .map(|col| axis_weight(&grid.centers_x, col as f64))
        .collect();

    Array2::from_shape_fn((h, w), |(row, col)| {
        let (y0, y1, ty) = axis_weight(&grid.centers_y, row as f64);
        let (x0, x1, tx) = col_weights[col];
        let l = &grid.levels;
        let top = l[[y0, x0]] as f64 * (1.0 - tx) + l[[y0, x1]] as f64 * tx;
        let bottom = l[[y1, x0]] as f64 * (1.0 - tx) + l[[y1, x1]] as f64 * tx;
        (top * (1.0 - ty) + bottom * ty) as f32
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_constant_image_gives_constant_background() {
        let data = Array2::from_elem((40, 50), 12.5f32);
        let mask = Array2::from_elem((40, 50), false);
        let bg = mesh_background(&data, &mask, 16, 3, 3.0).unwrap();
        for &v in bg.iter() {
            assert_abs_diff_eq!(v, 12.5, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_gradient_is_tracked() {
        let data = Array2::from_shape_fn((64, 64), |(_, c)| 100.0 + c as f32);
        let mask = Array2::from_elem((64, 64), false);
        let bg = mesh_background(&data, &mask, 16, 1, 3.0).unwrap();
        // Interior pixels between tile centres follow the ramp.
        assert_abs_diff_eq!(bg[[30, 30]], 130.0, epsilon = 1.0);
        assert!(bg[[30, 50]] > bg[[30, 10]]);
    }

    #[test]
    fn test_fully_masked_frame_falls_back_to_global_level() {
        let data = Array2::from_elem((20, 20), 3.0f32);
        let mask = Array2::from_elem((20, 20), true);
        let bg = mesh_background(&data, &mask, 8, 3, 3.0).unwrap();
        assert_abs_diff_eq!(bg[[5, 5]], 3.0, epsilon = 1e-6);
    }
}
