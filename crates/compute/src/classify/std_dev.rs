use crate::analysis::Statistics;

pub const DEFAULT_STD_DEV_CLASSES: usize = 7;

/// Breaks at `mean + i·σ` for `i` in `-(classes/2)..=classes/2`, keeping only
/// those inside the observed range.
///
/// Constant data has a single break at its value.
pub fn std_dev_breaks(values: &[f64], num_classes: usize) -> Vec<f64> {
    let data = Statistics::sorted_finite(values);
    let (Some(mean), Some(sd), Some((min, max))) = (
        Statistics::mean(&data),
        Statistics::std_dev(&data),
        Statistics::min_max(&data),
    ) else {
        return Vec::new();
    };
    if sd == 0.0 {
        return vec![mean];
    }

    let half = (num_classes / 2) as i64;
    let mut breaks: Vec<f64> = (-half..=half)
        .map(|i| mean + i as f64 * sd)
        .filter(|b| *b >= min && *b <= max)
        .collect();
    breaks.sort_by(f64::total_cmp);
    breaks.dedup();
    breaks
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_STD_DEV_CLASSES, std_dev_breaks};
    use pretty_assertions::assert_eq;

    #[test]
    fn keeps_only_breaks_inside_the_range() {
        // mean 5, sd 2
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let breaks = std_dev_breaks(&values, DEFAULT_STD_DEV_CLASSES);
        assert_eq!(breaks, vec![3.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn constant_data_has_one_break() {
        assert_eq!(std_dev_breaks(&[3.0, 3.0], 7), vec![3.0]);
    }

    #[test]
    fn empty_input_has_no_breaks() {
        assert!(std_dev_breaks(&[], 7).is_empty());
    }

    #[test]
    fn fewer_classes_narrow_the_range() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(std_dev_breaks(&values, 1), vec![5.0]);
        assert_eq!(std_dev_breaks(&values, 3), vec![3.0, 5.0, 7.0]);
    }
}
