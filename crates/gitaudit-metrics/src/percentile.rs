//! Percentile interpolation: `i = p·(n-1)/100`, then linear interpolation
//! between the sorted samples at `floor(i)` and `ceil(i)`.

/// `values` must already be sorted ascending. `p` is in `[0, 100]`.
pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    match sorted_values.len() {
        0 => 0.0,
        1 => sorted_values[0],
        n => {
            let rank = p * (n - 1) as f64 / 100.0;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let frac = rank - lower as f64;
            sorted_values[lower] * (1.0 - frac) + sorted_values[upper] * frac
        }
    }
}

pub fn median(sorted_values: &[f64]) -> f64 {
    percentile(sorted_values, 50.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p95_of_ten_evenly_spaced_samples() {
        let values: Vec<f64> = (1..=10).map(|n| (n * 10) as f64).collect();
        assert_eq!(percentile(&values, 95.0), 95.5);
    }

    #[test]
    fn p50_of_an_odd_count_lands_exactly_on_a_sample() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(median(&values), 3.0);
    }

    #[test]
    fn single_sample_is_every_percentile() {
        assert_eq!(percentile(&[42.0], 99.0), 42.0);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(percentile(&[], 50.0), 0.0);
    }
}
