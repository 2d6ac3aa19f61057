use ndarray::Array2;

use crate::stats;

/// Label 8-connected foreground regions using two-pass union-find.
///
/// Returns per-pixel labels (0 = background) resolved to their root label and
/// the pixel count of each root, indexed by label.
pub fn label_components(mask: &Array2<bool>) -> (Array2<u32>, Vec<usize>) {
    let (h, w) = mask.dim();
    let mut labels = Array2::<u32>::zeros((h, w));
    // Index 0 unused; labels start at 1.
    let mut parent: Vec<u32> = vec![0];

    // Pass 1: provisional labels from the four already-visited neighbours.
    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }
            let mut neighbours = [0u32; 4];
            if row > 0 {
                if col > 0 {
                    neighbours[0] = labels[[row - 1, col - 1]];
                }
                neighbours[1] = labels[[row - 1, col]];
                if col + 1 < w {
                    neighbours[2] = labels[[row - 1, col + 1]];
                }
            }
            if col > 0 {
                neighbours[3] = labels[[row, col - 1]];
            }

            let smallest = neighbours.iter().copied().filter(|&l| l > 0).min();
            match smallest {
                None => {
                    let label = parent.len() as u32;
                    parent.push(label);
                    labels[[row, col]] = label;
                }
                Some(label) => {
                    labels[[row, col]] = label;
                    for &other in neighbours.iter().filter(|&&l| l > 0 && l != label) {
                        union(&mut parent, label, other);
                    }
                }
            }
        }
    }

    // Pass 2: resolve to roots and count.
    let mut areas = vec![0usize; parent.len()];
    for label in labels.iter_mut() {
        if *label > 0 {
            *label = find(&parent, *label);
            areas[*label as usize] += 1;
        }
    }
    (labels, areas)
}

/// Drop connected regions with fewer than `min_pixels` pixels.
pub fn remove_small_components(mask: &Array2<bool>, min_pixels: usize) -> Array2<bool> {
    let (labels, areas) = label_components(mask);
    labels.mapv(|l| l > 0 && areas[l as usize] >= min_pixels)
}

/// Binary dilation with a `size` x `size` square, done as two separable
/// running-window passes.
pub fn dilate_square(mask: &Array2<bool>, size: usize) -> Array2<bool> {
    if size <= 1 {
        return mask.clone();
    }
    let before = size / 2;
    let after = size - 1 - before;
    let (h, w) = mask.dim();

    let mut horizontal = Array2::from_elem((h, w), false);
    let mut counts = vec![0usize; w.max(h) + 1];
    for row in 0..h {
        for col in 0..w {
            counts[col + 1] = counts[col] + mask[[row, col]] as usize;
        }
        for col in 0..w {
            let lo = col.saturating_sub(after);
            let hi = (col + before + 1).min(w);
            horizontal[[row, col]] = counts[hi] > counts[lo];
        }
    }

    let mut result = Array2::from_elem((h, w), false);
    for col in 0..w {
        for row in 0..h {
            counts[row + 1] = counts[row] + horizontal[[row, col]] as usize;
        }
        for row in 0..h {
            let lo = row.saturating_sub(after);
            let hi = (row + before + 1).min(h);
            result[[row, col]] = counts[hi] > counts[lo];
        }
    }
    result
}

/// Parameters of the source mask used before mesh background estimation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceMaskParams {
    pub snr: f32,
    pub npixels: usize,
    pub dilate_size: usize,
    pub sigma: f32,
    pub iterations: usize,
}

/// Mask pixels belonging to sources: above `median + snr * std` of the
/// sigma-clipped image, in regions of at least `npixels`, grown by a square.
pub fn source_mask(data: &Array2<f32>, params: &SourceMaskParams) -> Array2<bool> {
    let values = stats::finite_values(data);
    let Some(clipped) = stats::sigma_clipped_stats(&values, params.sigma, params.iterations) else {
        return Array2::from_elem(data.dim(), false);
    };
    let threshold = (clipped.median + params.snr as f64 * clipped.std) as f32;

    let segmented = data.mapv(|v| v.is_finite() && v > threshold);
    let sources = remove_small_components(&segmented, params.npixels);
    dilate_square(&sources, params.dilate_size)
}

fn find(parent: &[u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        x = parent[x as usize];
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (small, big) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[big as usize] = small;
    }
}
