/// Mean of the values, accumulated in f64. Empty input yields NaN.
pub fn mean_of(values: &[f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    (values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64) as f32
}

/// Sum of the values, accumulated in f64. Empty input yields NaN.
pub fn sum_of(values: &[f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() as f32
}
