use crate::analysis::Statistics;

pub const DEFAULT_HEAD_TAIL_ITERATIONS: usize = 10;

/// Share of the current subset above which the head stops being a minority.
const HEAD_LIMIT: f64 = 0.6;

/// Head/tail breaks for heavy-tailed data.
///
/// Splits at the mean and keeps descending into the values above it while
/// they are fewer than 60% of the current subset. The global minimum is
/// always the first break.
pub fn head_tail_breaks(values: &[f64], max_iterations: usize) -> Vec<f64> {
    let data = Statistics::sorted_finite(values);
    let Some(&min) = data.first() else {
        return Vec::new();
    };

    let mut breaks = vec![min];
    let mut subset = data;
    for _ in 0..max_iterations {
        if subset.len() <= 1 {
            break;
        }
        let Some(mean) = Statistics::mean(&subset) else {
            break;
        };
        breaks.push(mean);

        let head: Vec<f64> = subset.iter().copied().filter(|v| *v > mean).collect();
        if head.is_empty() || head.len() as f64 / subset.len() as f64 >= HEAD_LIMIT {
            break;
        }
        subset = head;
    }

    breaks.sort_by(f64::total_cmp);
    breaks.dedup();
    breaks
}
