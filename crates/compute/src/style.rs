use formats::{Style, StyleSuffix};
use serde_json::Value;

use crate::analysis::Statistics;

/// Up to this many distinct integers are treated as an enumeration.
pub const CATEGORICAL_MAX_UNIQUE: usize = 10;
/// Magnitude below which a value counts as sitting on zero.
pub const NEAR_ZERO: f64 = 0.01;
/// Minimum smaller/larger sign-count ratio for balanced mixed-sign data.
pub const DIVERGING_BALANCE: f64 = 0.3;

/// Picks a style suffix for `base` by looking at a small data sample.
///
/// - no sample, or only nulls: continuous
/// - only strings: categorical
/// - at most ten distinct values, all integers: categorical
/// - both signs present, with values near zero or a balanced split: diverging
/// - anything else: continuous
///
/// Booleans count as 0/1 so flag columns come out categorical.
pub fn determine_dynamic_style(sample: Option<&[Value]>, base: &str) -> Style {
    Style::new(base, dynamic_suffix(sample.unwrap_or_default()))
}

pub fn dynamic_suffix(sample: &[Value]) -> StyleSuffix {
    let present: Vec<&Value> = sample.iter().filter(|v| !v.is_null()).collect();
    if present.is_empty() {
        return StyleSuffix::Continuous;
    }
    if present.iter().all(|v| v.is_string()) {
        return StyleSuffix::Categorical;
    }

    let numbers: Vec<f64> = present
        .iter()
        .filter_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        })
        .filter(|v| v.is_finite())
        .collect();
    if numbers.is_empty() {
        return StyleSuffix::Continuous;
    }

    let distinct = Statistics::distinct_sorted(&numbers);
    if distinct.len() <= CATEGORICAL_MAX_UNIQUE && distinct.iter().all(|v| v.fract() == 0.0) {
        return StyleSuffix::Categorical;
    }

    let positive = numbers.iter().filter(|v| **v > 0.0).count();
    let negative = numbers.iter().filter(|v| **v < 0.0).count();
    if positive > 0 && negative > 0 {
        let near_zero = numbers.iter().any(|v| v.abs() < NEAR_ZERO);
        let balance = positive.min(negative) as f64 / positive.max(negative) as f64;
        if near_zero || balance > DIVERGING_BALANCE {
            return StyleSuffix::Diverging;
        }
    }

    StyleSuffix::Continuous
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn style_of(sample: Value) -> String {
        let values = sample.as_array().cloned().unwrap_or_default();
        determine_dynamic_style(Some(&values), "polygon").to_string()
    }

    #[test]
    fn absent_or_empty_sample_is_continuous() {
        assert_eq!(determine_dynamic_style(None, "line").to_string(), "line-continuous");
        assert_eq!(style_of(json!([])), "polygon-continuous");
        assert_eq!(style_of(json!([null, null])), "polygon-continuous");
    }

    #[test]
    fn strings_are_categorical() {
        assert_eq!(style_of(json!(["bus", "rail", "bus"])), "polygon-categorical");
        assert_eq!(style_of(json!(["1.5", "2.5", null])), "polygon-categorical");
    }

    #[test]
    fn small_integer_sets_are_categorical() {
        assert_eq!(style_of(json!([0, 1, 1, 0, 1])), "polygon-categorical");
        assert_eq!(style_of(json!([true, false, true])), "polygon-categorical");
        assert_eq!(style_of(json!([-2, -1, 0, 1, 2])), "polygon-categorical");
    }

    #[test]
    fn many_integers_are_continuous() {
        let values: Vec<i64> = (1..=20).collect();
        assert_eq!(style_of(json!(values)), "polygon-continuous");
    }

    #[test]
    fn balanced_mixed_signs_diverge() {
        assert_eq!(style_of(json!([-5.5, 3.2, -1.1, 4.4])), "polygon-diverging");
    }

    #[test]
    fn skewed_mixed_signs_need_a_value_near_zero() {
        let skewed = json!([-0.5, 10.5, 20.1, 30.2, 40.3, 50.7]);
        assert_eq!(style_of(skewed), "polygon-continuous");
        let with_zero = json!([-0.5, 0.001, 10.5, 20.1, 30.2, 40.3, 50.7]);
        assert_eq!(style_of(with_zero), "polygon-diverging");
    }

    #[test]
    fn positive_fractions_are_continuous() {
        assert_eq!(style_of(json!([0.5, 1.25, 3.75, 2.5])), "polygon-continuous");
    }
}
