//! Fisher-Jenks natural breaks.

use crate::analysis::Statistics;

/// Natural-breaks classification of `values` into at most `k` classes.
///
/// Returns the lower bound of each class in ascending order, so the first
/// break is always the minimum. When the data has `k` or fewer distinct values
/// those values are returned unchanged. A single value yields itself as the
/// only break.
///
/// Runs in O(n²·k) and is meant for bounded samples, not whole datasets.
pub fn jenks_breaks(values: &[f64], k: usize) -> Vec<f64> {
    let data = Statistics::sorted_finite(values);
    if k == 0 || data.is_empty() {
        return Vec::new();
    }
    let distinct = Statistics::distinct_sorted(&data);
    if distinct.len() <= k {
        return distinct;
    }

    let lower = lower_class_limits(&data, k);

    let mut breaks = vec![data[0]; k];
    let mut upper = data.len();
    for class in (1..=k).rev() {
        // 1-based index of the first element in this class.
        let Some(first) = lower[upper][class].checked_sub(1) else {
            break;
        };
        breaks[class - 1] = data[first];
        upper = first;
        if upper == 0 {
            break;
        }
    }

    breaks.dedup();
    breaks
}

/// Dynamic-programming table of optimal class starts.
///
/// `limits[l][j]` is the 1-based index where the last of `j` classes starts
/// when partitioning the first `l` sorted values. Row and column zero are
/// unused.
fn lower_class_limits(data: &[f64], k: usize) -> Vec<Vec<usize>> {
    let n = data.len();
    let mut limits = vec![vec![0usize; k + 1]; n + 1];
    let mut variance = vec![vec![0.0f64; k + 1]; n + 1];

    for j in 1..=k {
        limits[1][j] = 1;
        variance[1][j] = 0.0;
        for row in variance.iter_mut().skip(2) {
            row[j] = f64::INFINITY;
        }
    }

    for l in 2..=n {
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut w = 0.0;
        let mut segment_variance = 0.0;

        for m in 1..=l {
            let class_start = l - m + 1;
            let v = data[class_start - 1];
            w += 1.0;
            sum += v;
            sum_sq += v * v;
            segment_variance = sum_sq - (sum * sum) / w;

            let prev = class_start - 1;
            if prev != 0 {
                for j in 2..=k {
                    let candidate = segment_variance + variance[prev][j - 1];
                    if variance[l][j] >= candidate {
                        limits[l][j] = class_start;
                        variance[l][j] = candidate;
                    }
                }
            }
        }

        limits[l][1] = 1;
        variance[l][1] = segment_variance;
    }

    limits
}

#[cfg(test)]
mod tests {
    use super::jenks_breaks;
    use pretty_assertions::assert_eq;

    #[test]
    fn few_distinct_values_come_back_unchanged() {
        assert_eq!(jenks_breaks(&[3.0, 1.0, 3.0, 2.0], 5), vec![1.0, 2.0, 3.0]);
        assert_eq!(jenks_breaks(&[4.0, 4.0, 9.0], 2), vec![4.0, 9.0]);
    }

    #[test]
    fn single_value_is_its_own_break() {
        assert_eq!(jenks_breaks(&[42.0], 5), vec![42.0]);
        assert_eq!(jenks_breaks(&[42.0], 1), vec![42.0]);
    }

    #[test]
    fn empty_input_or_zero_classes() {
        assert!(jenks_breaks(&[], 3).is_empty());
        assert!(jenks_breaks(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn separates_obvious_clusters() {
        let values = [1.0, 2.0, 1.5, 10.0, 11.0, 10.5, 50.0, 51.0, 52.0];
        assert_eq!(jenks_breaks(&values, 3), vec![1.0, 10.0, 50.0]);
    }

    #[test]
    fn one_class_is_the_minimum() {
        assert_eq!(jenks_breaks(&[5.0, 1.0, 9.0], 1), vec![1.0]);
    }

    #[test]
    fn breaks_are_strictly_ascending_with_ties() {
        let values = [1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 3.0, 7.0, 7.0, 8.0, 20.0];
        let breaks = jenks_breaks(&values, 4);
        assert_eq!(breaks.first(), Some(&1.0));
        assert!(breaks.windows(2).all(|w| w[0] < w[1]), "{breaks:?}");
        assert!(breaks.len() <= 4);
    }
}
