/// Median of the values. Uses `select_nth_unstable` for O(n) median without
/// a full sort; reorders `values`. Empty input yields NaN.
pub fn median_of(values: &mut [f32]) -> f32 {
    let n = values.len();
    match n {
        0 => f32::NAN,
        1 => values[0],
        _ if n % 2 == 1 => {
            let mid = n / 2;
            *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1
        }
        _ => {
            let mid = n / 2;
            values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
            let upper = values[mid];
            let lower = *values[..mid]
                .select_nth_unstable_by(mid - 1, |a, b| a.total_cmp(b))
                .1;
            (lower + upper) / 2.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_of_even_count_averages_middle_pair() {
        assert_eq!(median_of(&mut [5.0, 1.0, 4.0, 2.0]), 3.0);
    }

    #[test]
    fn test_median_of_odd_count() {
        assert_eq!(median_of(&mut [9.0, 100.0, 1.0]), 9.0);
    }
}
