use serde::{Deserialize, Serialize};

use crate::consts::EPSILON;
use crate::stats;

/// Parameters for per-pixel sigma-clipping rejection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaClipParams {
    /// Number of rejection iterations (default: 5).
    pub iterations: usize,
    /// Values beyond mean +/- sigma*stddev are rejected (default: 3.0).
    pub sigma: f32,
}

impl Default for SigmaClipParams {
    fn default() -> Self {
        Self {
            iterations: 5,
            sigma: 3.0,
        }
    }
}

/// Reject outliers from `values` in place, keeping survivors in their
/// original order. If every value would be rejected the input is kept whole.
pub fn clip_in_place(values: &mut Vec<f32>, scratch: &mut Vec<f32>, params: &SigmaClipParams) {
    for _ in 0..params.iterations {
        let (mean, stddev) = stats::mean_stddev(values);
        if stddev < EPSILON as f64 {
            break;
        }
        let lo = mean - params.sigma as f64 * stddev;
        let hi = mean + params.sigma as f64 * stddev;

        scratch.clear();
        scratch.extend(
            values
                .iter()
                .copied()
                .filter(|&v| (v as f64) >= lo && (v as f64) <= hi),
        );
        if scratch.is_empty() || scratch.len() == values.len() {
            break;
        }
        std::mem::swap(values, scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_removes_single_outlier() {
        let mut values = vec![10.0, 10.5, 9.5, 10.2, 9.8, 500.0];
        let mut scratch = Vec::new();
        clip_in_place(&mut values, &mut scratch, &SigmaClipParams { iterations: 3, sigma: 2.0 });
        assert_eq!(values.len(), 5);
        assert!(!values.contains(&500.0));
    }

    #[test]
    fn test_clip_keeps_constant_values() {
        let mut values = vec![7.0; 4];
        let mut scratch = Vec::new();
        clip_in_place(&mut values, &mut scratch, &SigmaClipParams::default());
        assert_eq!(values, vec![7.0; 4]);
    }
}
