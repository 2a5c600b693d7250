pub struct Statistics;

impl Statistics {
    pub fn mean(values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Smallest and largest value, `None` for an empty slice.
    pub fn min_max(values: &[f64]) -> Option<(f64, f64)> {
        let (&first, rest) = values.split_first()?;
        Some(
            rest.iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }

    /// Population standard deviation.
    pub fn std_dev(values: &[f64]) -> Option<f64> {
        let mean = Self::mean(values)?;
        let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        Some((sum_sq / values.len() as f64).sqrt())
    }

    /// Finite values in ascending order. NaN and infinities are dropped.
    pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
        let mut out: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        out.sort_by(f64::total_cmp);
        out
    }

    /// Distinct finite values in ascending order.
    pub fn distinct_sorted(values: &[f64]) -> Vec<f64> {
        let mut out = Self::sorted_finite(values);
        out.dedup();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::Statistics;

    #[test]
    fn mean_and_range() {
        let m = Statistics::mean(&[1.0, 2.0, 3.0]).unwrap();
        assert!((m - 2.0).abs() < 1e-9);
        assert_eq!(Statistics::mean(&[]), None);
        assert_eq!(Statistics::min_max(&[4.0, -1.0, 9.5]), Some((-1.0, 9.5)));
    }

    #[test]
    fn std_dev_is_population() {
        let sd = Statistics::std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((sd - 2.0).abs() < 1e-9);
    }

    #[test]
    fn distinct_sorted_drops_non_finite_and_duplicates() {
        let out = Statistics::distinct_sorted(&[3.0, f64::NAN, 1.0, 3.0, f64::INFINITY, -2.0]);
        assert_eq!(out, vec![-2.0, 1.0, 3.0]);
    }
}
