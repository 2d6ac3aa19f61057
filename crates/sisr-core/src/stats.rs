use ndarray::Array2;

use crate::consts::{BIWEIGHT_C, MAD_TO_SIGMA};

/// Finite pixel values in row-major order.
pub fn finite_values(data: &Array2<f32>) -> Vec<f32> {
    data.iter().copied().filter(|v| v.is_finite()).collect()
}

pub fn mean(values: &[f32]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64)
}

/// Mean and population standard deviation.
pub fn mean_stddev(values: &[f32]) -> (f64, f64) {
    let Some(mean) = mean(values) else {
        return (0.0, 0.0);
    };
    let var = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, var.sqrt())
}

/// Median via selection. Reorders `values`.
pub fn median(values: &mut [f32]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    let upper = *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1 as f64;
    if n % 2 == 1 {
        return Some(upper);
    }
    let lower = *values[..mid]
        .select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b))
        .1 as f64;
    Some((lower + upper) / 2.0)
}

/// Median absolute deviation scaled to a Gaussian standard deviation.
pub fn mad_std(values: &[f32]) -> Option<f64> {
    let mut scratch = values.to_vec();
    let center = median(&mut scratch)?;
    for (s, &v) in scratch.iter_mut().zip(values) {
        *s = (v as f64 - center).abs() as f32;
    }
    Some(median(&mut scratch)? * MAD_TO_SIGMA)
}

/// Tukey biweight location with tuning constant `c`.
pub fn biweight_location(values: &[f32], c: f64) -> Option<f64> {
    let mut scratch = values.to_vec();
    let m = median(&mut scratch)?;
    for (s, &v) in scratch.iter_mut().zip(values) {
        *s = (v as f64 - m).abs() as f32;
    }
    let mad = median(&mut scratch)?;
    if mad == 0.0 {
        return Some(m);
    }

    let mut num = 0.0f64;
    let mut den = 0.0f64;
    for &v in values {
        let d = v as f64 - m;
        let u = d / (c * mad);
        if u.abs() < 1.0 {
            let w = (1.0 - u * u).powi(2);
            num += d * w;
            den += w;
        }
    }
    if den == 0.0 { Some(m) } else { Some(m + num / den) }
}

/// Statistics of the values surviving iterative median-centred clipping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClippedStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub retained: usize,
}

/// Iteratively reject values further than `sigma` standard deviations from
/// the median, stopping when nothing is rejected or after `max_iters` passes.
pub fn sigma_clipped_stats(values: &[f32], sigma: f32, max_iters: usize) -> Option<ClippedStats> {
    let mut kept: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if kept.is_empty() {
        return None;
    }

    let mut scratch = Vec::with_capacity(kept.len());
    for _ in 0..max_iters {
        scratch.clear();
        scratch.extend_from_slice(&kept);
        let center = median(&mut scratch)?;
        let (_, std) = mean_stddev(&kept);
        if std <= 0.0 {
            break;
        }
        let limit = sigma as f64 * std;
        let before = kept.len();
        kept.retain(|&v| (v as f64 - center).abs() <= limit);
        if kept.len() == before || kept.is_empty() {
            break;
        }
    }
    if kept.is_empty() {
        return None;
    }

    let (mean, std) = mean_stddev(&kept);
    let retained = kept.len();
    let median = median(&mut kept)?;
    Some(ClippedStats {
        mean,
        median,
        std,
        retained,
    })
}

/// Summary statistics of a frame's background, as reported after subtraction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackgroundStats {
    pub mean: f64,
    pub median: f64,
    pub biweight: f64,
    pub mad_std: f64,
    pub clipped: ClippedStats,
}

impl BackgroundStats {
    pub fn compute(values: &[f32], sigma: f32, max_iters: usize) -> Option<Self> {
        let mut scratch = values.to_vec();
        Some(Self {
            mean: mean(values)?,
            median: median(&mut scratch)?,
            biweight: biweight_location(values, BIWEIGHT_C)?,
            mad_std: mad_std(values)?,
            clipped: sigma_clipped_stats(values, sigma, max_iters)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn test_mad_std_of_symmetric_values() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(mad_std(&values).unwrap(), MAD_TO_SIGMA, epsilon = 1e-9);
    }

    #[test]
    fn test_sigma_clip_rejects_outlier() {
        let mut values: Vec<f32> = (0..50).map(|i| 8.0 + (i % 5) as f32).collect();
        values.push(1000.0);
        let stats = sigma_clipped_stats(&values, 3.0, 5).unwrap();
        assert_eq!(stats.retained, 50);
        assert_relative_eq!(stats.median, 10.0);
        assert_relative_eq!(stats.mean, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_biweight_ignores_far_outliers() {
        let mut values: Vec<f32> = (0..21).map(|i| 100.0 + (i % 3) as f32).collect();
        values.push(1e6);
        let loc = biweight_location(&values, BIWEIGHT_C).unwrap();
        assert!((loc - 101.0).abs() < 0.5, "biweight = {loc}");
    }
}
